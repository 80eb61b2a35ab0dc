use crate::models::ModelSpec;

/// Input to one fallback run. The candidate order is the try order.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub credential: String,
    pub input_image: Vec<u8>,
    pub prompt: String,
    pub candidates: Vec<ModelSpec>,
}

/// What a fallback run produced.
///
/// `Degraded` means no model produced an image and the input was passed
/// through unchanged; callers must not present it as an enhancement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Success { model: String, image: Vec<u8> },
    Degraded { original: Vec<u8>, reason: String },
    Failure { reason: String },
}

impl GenerationOutcome {
    /// Bytes to hand to the next stage, if any.
    pub fn image(&self) -> Option<&[u8]> {
        match self {
            GenerationOutcome::Success { image, .. } => Some(image),
            GenerationOutcome::Degraded { original, .. } => Some(original),
            GenerationOutcome::Failure { .. } => None,
        }
    }

    pub fn into_image(self) -> Option<Vec<u8>> {
        match self {
            GenerationOutcome::Success { image, .. } => Some(image),
            GenerationOutcome::Degraded { original, .. } => Some(original),
            GenerationOutcome::Failure { .. } => None,
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            GenerationOutcome::Success { model, .. } => Some(model),
            _ => None,
        }
    }

    pub fn is_enhanced(&self) -> bool {
        matches!(self, GenerationOutcome::Success { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, GenerationOutcome::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            GenerationOutcome::Success { .. } => None,
            GenerationOutcome::Degraded { reason, .. } | GenerationOutcome::Failure { reason } => {
                Some(reason)
            }
        }
    }
}

/// One failed try inside a fallback run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub model: String,
    pub provider: String,
    pub error: String,
}
