use std::fmt;

use serde::{Deserialize, Serialize};

/// The six wizard steps, in the only order they may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Face,
    Dataset,
    Upscale,
    Voice,
    Motion,
    Assembly,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 6] = [
        PipelineStage::Face,
        PipelineStage::Dataset,
        PipelineStage::Upscale,
        PipelineStage::Voice,
        PipelineStage::Motion,
        PipelineStage::Assembly,
    ];

    /// 1-based step number used by the HTTP responses.
    pub fn number(self) -> u8 {
        match self {
            PipelineStage::Face => 1,
            PipelineStage::Dataset => 2,
            PipelineStage::Upscale => 3,
            PipelineStage::Voice => 4,
            PipelineStage::Motion => 5,
            PipelineStage::Assembly => 6,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.number() == number)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Face => "face",
            PipelineStage::Dataset => "dataset",
            PipelineStage::Upscale => "upscale",
            PipelineStage::Voice => "voice",
            PipelineStage::Motion => "motion",
            PipelineStage::Assembly => "assembly",
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.number().checked_sub(1).and_then(Self::from_number)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
