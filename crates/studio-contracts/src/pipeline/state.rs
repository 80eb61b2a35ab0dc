use std::fmt;

use super::assembly::AssemblyBundle;
use super::dataset::DatasetItem;
use super::motion::MotionOutcome;
use super::stage::PipelineStage;

/// Script for the voice-over plus audio rendered elsewhere, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceTrack {
    pub script: String,
    pub audio: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// `stage` cannot run because `missing` has no output yet.
    NotReady {
        stage: PipelineStage,
        missing: &'static str,
    },
    AtFirstStage,
    AtLastStage,
    /// The current stage has not produced output, so forward is blocked.
    Incomplete(PipelineStage),
    UnknownItem(u32),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::NotReady { stage, missing } => {
                write!(f, "stage '{stage}' requires {missing} first")
            }
            StateError::AtFirstStage => f.write_str("already at the first stage"),
            StateError::AtLastStage => f.write_str("already at the last stage"),
            StateError::Incomplete(stage) => write!(f, "stage '{stage}' has no output yet"),
            StateError::UnknownItem(id) => write!(f, "no image with id {id}"),
        }
    }
}

impl std::error::Error for StateError {}

/// Explicit wizard state: which step is showing and what every step has
/// produced so far.
///
/// A stage may run only when its direct predecessor has output (the face
/// stage needs the source image). Recording a stage's output discards the
/// outputs of every later stage, so re-running a step never mixes results
/// from two different upstream runs.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    current: Option<PipelineStage>,
    source: Option<Vec<u8>>,
    face: Option<DatasetItem>,
    dataset: Option<Vec<DatasetItem>>,
    upscaled: Option<Vec<DatasetItem>>,
    voice: Option<VoiceTrack>,
    motion: Option<MotionOutcome>,
    assembly: Option<AssemblyBundle>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> PipelineStage {
        self.current.unwrap_or(PipelineStage::Face)
    }

    pub fn set_source(&mut self, image: Vec<u8>) {
        self.source = Some(image);
        self.clear_from(PipelineStage::Face);
        self.current = Some(PipelineStage::Face);
    }

    pub fn has_output(&self, stage: PipelineStage) -> bool {
        match stage {
            PipelineStage::Face => self.face.is_some(),
            PipelineStage::Dataset => self.dataset.is_some(),
            PipelineStage::Upscale => self.upscaled.is_some(),
            PipelineStage::Voice => self.voice.is_some(),
            PipelineStage::Motion => self.motion.is_some(),
            PipelineStage::Assembly => self.assembly.is_some(),
        }
    }

    pub fn can_run(&self, stage: PipelineStage) -> bool {
        self.ensure_can_run(stage).is_ok()
    }

    pub fn ensure_can_run(&self, stage: PipelineStage) -> Result<(), StateError> {
        let ready = match stage {
            PipelineStage::Face => self.source.is_some(),
            PipelineStage::Upscale => self
                .dataset
                .as_ref()
                .map(|items| !items.is_empty())
                .unwrap_or(false),
            other => other
                .previous()
                .map(|previous| self.has_output(previous))
                .unwrap_or(false),
        };
        if ready {
            return Ok(());
        }
        let missing = match stage {
            PipelineStage::Face => "a source image",
            PipelineStage::Dataset => "a face image",
            PipelineStage::Upscale => "dataset images",
            PipelineStage::Voice => "upscaled images",
            PipelineStage::Motion => "a voice track",
            PipelineStage::Assembly => "a motion result",
        };
        Err(StateError::NotReady { stage, missing })
    }

    pub fn advance(&mut self) -> Result<PipelineStage, StateError> {
        let current = self.current();
        if !self.has_output(current) {
            return Err(StateError::Incomplete(current));
        }
        let next = current.next().ok_or(StateError::AtLastStage)?;
        self.current = Some(next);
        Ok(next)
    }

    pub fn back(&mut self) -> Result<PipelineStage, StateError> {
        let previous = self.current().previous().ok_or(StateError::AtFirstStage)?;
        self.current = Some(previous);
        Ok(previous)
    }

    pub fn record_face(&mut self, item: DatasetItem) -> Result<(), StateError> {
        self.ensure_can_run(PipelineStage::Face)?;
        self.clear_from(PipelineStage::Face);
        self.face = Some(item);
        Ok(())
    }

    pub fn record_dataset(&mut self, items: Vec<DatasetItem>) -> Result<(), StateError> {
        self.ensure_can_run(PipelineStage::Dataset)?;
        self.clear_from(PipelineStage::Dataset);
        self.dataset = Some(items);
        Ok(())
    }

    pub fn record_upscaled(&mut self, items: Vec<DatasetItem>) -> Result<(), StateError> {
        self.ensure_can_run(PipelineStage::Upscale)?;
        self.clear_from(PipelineStage::Upscale);
        self.upscaled = Some(items);
        Ok(())
    }

    pub fn record_voice(&mut self, track: VoiceTrack) -> Result<(), StateError> {
        self.ensure_can_run(PipelineStage::Voice)?;
        self.clear_from(PipelineStage::Voice);
        self.voice = Some(track);
        Ok(())
    }

    pub fn record_motion(&mut self, outcome: MotionOutcome) -> Result<(), StateError> {
        self.ensure_can_run(PipelineStage::Motion)?;
        self.clear_from(PipelineStage::Motion);
        self.motion = Some(outcome);
        Ok(())
    }

    pub fn record_assembly(&mut self, bundle: AssemblyBundle) -> Result<(), StateError> {
        self.ensure_can_run(PipelineStage::Assembly)?;
        self.assembly = Some(bundle);
        Ok(())
    }

    pub fn source(&self) -> Option<&[u8]> {
        self.source.as_deref()
    }

    pub fn face(&self) -> Option<&DatasetItem> {
        self.face.as_ref()
    }

    pub fn dataset(&self) -> &[DatasetItem] {
        self.dataset.as_deref().unwrap_or_default()
    }

    pub fn upscaled(&self) -> &[DatasetItem] {
        self.upscaled.as_deref().unwrap_or_default()
    }

    pub fn voice(&self) -> Option<&VoiceTrack> {
        self.voice.as_ref()
    }

    pub fn motion(&self) -> Option<&MotionOutcome> {
        self.motion.as_ref()
    }

    pub fn assembly(&self) -> Option<&AssemblyBundle> {
        self.assembly.as_ref()
    }

    /// Image used for the motion stage: the upscaled item with `id`, or the
    /// first upscaled item when no id is given.
    pub fn motion_input(&self, id: Option<u32>) -> Result<&DatasetItem, StateError> {
        let items = self.upscaled();
        match id {
            Some(id) => items
                .iter()
                .find(|item| item.id == id)
                .ok_or(StateError::UnknownItem(id)),
            None => items.first().ok_or(StateError::NotReady {
                stage: PipelineStage::Motion,
                missing: "upscaled images",
            }),
        }
    }

    /// Best available image set for assembly: upscaled, else dataset.
    pub fn assembly_images(&self) -> Vec<Vec<u8>> {
        let items = if self.upscaled().is_empty() {
            self.dataset()
        } else {
            self.upscaled()
        };
        items.iter().map(|item| item.image.clone()).collect()
    }

    fn clear_from(&mut self, stage: PipelineStage) {
        for later in PipelineStage::ALL.into_iter().filter(|other| *other >= stage) {
            match later {
                PipelineStage::Face => self.face = None,
                PipelineStage::Dataset => self.dataset = None,
                PipelineStage::Upscale => self.upscaled = None,
                PipelineStage::Voice => self.voice = None,
                PipelineStage::Motion => self.motion = None,
                PipelineStage::Assembly => self.assembly = None,
            }
        }
    }
}
