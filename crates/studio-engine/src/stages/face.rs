use studio_contracts::models::Capability;
use studio_contracts::pipeline::prompts::FACE_PROMPT;
use studio_contracts::pipeline::{
    Attempt, GenerationOutcome, GenerationRequest, PipelineStage,
};

use super::{StageContext, StageError};
use crate::fallback::FallbackPolicy;

const FACE_DEGRADED_SUGGESTION: &str = "Your API key may not have access to image generation models. The workflow will continue with your original image.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceOutput {
    pub image: Vec<u8>,
    pub model: Option<String>,
    pub degraded: bool,
    pub message: String,
    pub note: Option<String>,
    pub suggestion: Option<String>,
    pub attempts: Vec<Attempt>,
}

/// Studio portrait from the uploaded selfie. Falls back to the upload itself
/// when no portrait model answers with an image.
pub fn run_face(
    ctx: &StageContext<'_>,
    image: &[u8],
    requested_model: Option<&str>,
) -> Result<FaceOutput, StageError> {
    let key = ctx.require_key("API key and image required")?;
    if image.is_empty() {
        return Err(StageError::Validation("API key and image required".to_string()));
    }

    let plan = ctx.selector.candidates(requested_model, Capability::Portrait);
    if let Some(reason) = plan.fallback_reason.as_deref() {
        tracing::warn!(%reason, "portrait model request ignored");
    }
    let request = GenerationRequest {
        credential: key.to_string(),
        input_image: image.to_vec(),
        prompt: FACE_PROMPT.to_string(),
        candidates: plan.models,
    };
    let report = ctx
        .fallback(ctx.config.fallback_delay, PipelineStage::Face)
        .run(&request, FallbackPolicy::DegradeToInput);

    match report.outcome {
        GenerationOutcome::Success { model, image } => Ok(FaceOutput {
            message: format!("Face created successfully (using {model})"),
            image,
            model: Some(model),
            degraded: false,
            note: plan.fallback_reason,
            suggestion: None,
            attempts: report.attempts,
        }),
        GenerationOutcome::Degraded { original, reason } => {
            tracing::warn!(%reason, "face stage degraded to original image");
            Ok(FaceOutput {
                image: original,
                model: None,
                degraded: true,
                message: "Using original image (image generation not available)".to_string(),
                note: Some(reason),
                suggestion: Some(FACE_DEGRADED_SUGGESTION.to_string()),
                attempts: report.attempts,
            })
        }
        GenerationOutcome::Failure { reason } => Err(StageError::Internal(anyhow::anyhow!(reason))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use studio_contracts::models::ModelSelector;

    use super::*;
    use crate::dryrun::DryrunVideoModel;
    use crate::providers::fakes::{Reply, ScriptedModel};
    use crate::stages::testing;

    fn run(
        key: &str,
        image: &[u8],
        requested: Option<&str>,
        model: &Arc<ScriptedModel>,
    ) -> (Result<FaceOutput, StageError>, Vec<String>) {
        let session = testing::session(key);
        let providers = testing::providers(model);
        let selector = ModelSelector::new(Some(testing::registry()));
        let config = testing::config();
        let ctx = StageContext {
            session: &session,
            providers: &providers,
            video: &DryrunVideoModel,
            selector: &selector,
            config: &config,
            events: None,
        };
        let result = run_face(&ctx, image, requested);
        (result, model.call_models())
    }

    #[test]
    fn missing_key_or_image_makes_no_calls() {
        let model = Arc::new(ScriptedModel::new("fake").with_default(Reply::Image(vec![1])));
        let (result, calls) = run("  ", &[1], None, &model);
        assert!(matches!(result, Err(StageError::Validation(_))));
        let (result, calls_after) = run("key", &[], None, &model);
        assert!(matches!(result, Err(StageError::Validation(_))));
        assert!(calls.is_empty());
        assert!(calls_after.is_empty());
    }

    #[test]
    fn second_model_success_is_reported() {
        let model = Arc::new(
            ScriptedModel::new("fake")
                .script("m1", vec![Reply::Error("404 model not found")])
                .script("m2", vec![Reply::Image(vec![42])]),
        );
        let (result, calls) = run("key", &[1, 2], None, &model);
        let output = result.unwrap();
        assert_eq!(calls, vec!["m1", "m2"]);
        assert_eq!(output.image, vec![42]);
        assert_eq!(output.model.as_deref(), Some("m2"));
        assert_eq!(output.message, "Face created successfully (using m2)");
        assert!(!output.degraded);
    }

    #[test]
    fn all_failing_returns_original_with_note() {
        let model = Arc::new(ScriptedModel::new("fake").with_default(Reply::TextOnly));
        let (result, calls) = run("key", &[9, 9], None, &model);
        let output = result.unwrap();
        assert_eq!(calls, vec!["m1", "m2", "m3"]);
        assert_eq!(output.image, vec![9, 9]);
        assert!(output.degraded);
        assert_eq!(
            output.note.as_deref(),
            Some("Tried models: m1, m2, m3. Last error: No image in response")
        );
    }

    #[test]
    fn requested_model_is_tried_first() {
        let model = Arc::new(ScriptedModel::new("fake").with_default(Reply::Image(vec![5])));
        let (_, calls) = run("key", &[1], Some("m3"), &model);
        assert_eq!(calls, vec!["m3"]);
    }
}
