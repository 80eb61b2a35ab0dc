//! One handler per pipeline step. Handlers are plain functions over a
//! [`StageContext`]; they hold no state between calls.

use std::time::Duration;

use studio_contracts::events::EventWriter;
use studio_contracts::models::ModelSelector;
use studio_contracts::pipeline::{ExternalTool, PipelineStage, StateError};
use studio_contracts::session::SessionContext;

use crate::config::EngineConfig;
use crate::fallback::FallbackSelector;
use crate::providers::ImageProviderRegistry;
use crate::video::VideoModel;

mod assembly;
mod dataset;
mod face;
mod motion;
mod upscale;
mod voice;

pub use assembly::{run_assembly, AssemblyInput, AssemblyOutput};
pub use dataset::{run_dataset, DatasetOutput};
pub use face::{run_face, FaceOutput};
pub use motion::{classify_motion_error, run_motion, MotionOutput, MOTION_INTERNAL_SUGGESTION};
pub use upscale::{run_upscale, UpscaleOutput};
pub use voice::run_voice;

/// Everything a stage call may touch, passed in explicitly.
pub struct StageContext<'a> {
    pub session: &'a SessionContext,
    pub providers: &'a ImageProviderRegistry,
    pub video: &'a dyn VideoModel,
    pub selector: &'a ModelSelector,
    pub config: &'a EngineConfig,
    pub events: Option<&'a EventWriter>,
}

impl<'a> StageContext<'a> {
    pub(crate) fn fallback(&self, delay: Duration, stage: PipelineStage) -> FallbackSelector<'a> {
        FallbackSelector::new(self.providers, delay).with_events(self.events, stage)
    }

    /// The trimmed API key, or a validation error carrying `message`.
    pub(crate) fn require_key(&self, message: &str) -> Result<&'a str, StageError> {
        let key = self.session.api_key();
        if key.is_empty() {
            return Err(StageError::Validation(message.to_string()));
        }
        Ok(key)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Bad or missing input; nothing was sent to a provider.
    #[error("{0}")]
    Validation(String),
    #[error("{message}")]
    ModelUnavailable {
        message: String,
        suggestion: String,
        tools: &'static [ExternalTool],
    },
    #[error("{message}")]
    AccessDenied {
        message: String,
        suggestion: String,
        tools: &'static [ExternalTool],
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StageError {
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            StageError::ModelUnavailable { suggestion, .. }
            | StageError::AccessDenied { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    pub fn external_tools(&self) -> &'static [ExternalTool] {
        match self {
            StageError::ModelUnavailable { tools, .. } | StageError::AccessDenied { tools, .. } => {
                tools
            }
            _ => &[],
        }
    }
}

impl From<StateError> for StageError {
    fn from(err: StateError) -> Self {
        StageError::Validation(err.to_string())
    }
}
