use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use studio_contracts::events::{EventKind, EventPayload, EventWriter};
use studio_contracts::models::ModelSpec;
use studio_contracts::pipeline::{Attempt, GenerationOutcome, GenerationRequest, PipelineStage};

use crate::providers::{ImageInvocation, ImageProviderRegistry};
use crate::{error_chain_text, map_object, sniff_image_mime};

/// What to hand back when every candidate failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Pass the input image through as a `Degraded` outcome.
    #[default]
    DegradeToInput,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackReport {
    pub outcome: GenerationOutcome,
    pub attempts: Vec<Attempt>,
}

impl FallbackReport {
    pub fn tried_models(&self) -> Vec<String> {
        self.attempts
            .iter()
            .map(|attempt| attempt.model.clone())
            .collect()
    }
}

/// Walks a candidate list one model at a time and stops at the first image.
///
/// Strictly sequential. There is no retry within a model; the fixed delay
/// only separates consecutive attempts.
pub struct FallbackSelector<'a> {
    providers: &'a ImageProviderRegistry,
    delay: Duration,
    events: Option<&'a EventWriter>,
    stage: Option<PipelineStage>,
}

impl<'a> FallbackSelector<'a> {
    pub fn new(providers: &'a ImageProviderRegistry, delay: Duration) -> Self {
        Self {
            providers,
            delay,
            events: None,
            stage: None,
        }
    }

    pub fn with_events(mut self, events: Option<&'a EventWriter>, stage: PipelineStage) -> Self {
        self.events = events;
        self.stage = Some(stage);
        self
    }

    pub fn run(&self, request: &GenerationRequest, policy: FallbackPolicy) -> FallbackReport {
        let mime_type = sniff_image_mime(&request.input_image);
        let mut attempts = Vec::new();

        for (idx, candidate) in request.candidates.iter().enumerate() {
            if idx > 0 && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            tracing::info!(model = %candidate.name, provider = %candidate.provider, "trying model");
            match self.invoke(candidate, request, mime_type) {
                Ok(image) => {
                    tracing::info!(model = %candidate.name, bytes = image.len(), "model produced an image");
                    return FallbackReport {
                        outcome: GenerationOutcome::Success {
                            model: candidate.name.clone(),
                            image,
                        },
                        attempts,
                    };
                }
                Err(err) => {
                    let error = error_chain_text(&err, 300);
                    tracing::warn!(model = %candidate.name, error = %error, "model attempt failed");
                    self.emit_failure(candidate, &error);
                    attempts.push(Attempt {
                        model: candidate.name.clone(),
                        provider: candidate.provider.clone(),
                        error,
                    });
                }
            }
        }

        let reason = exhausted_reason(&attempts);
        let outcome = match policy {
            FallbackPolicy::DegradeToInput => GenerationOutcome::Degraded {
                original: request.input_image.clone(),
                reason,
            },
            FallbackPolicy::Fail => GenerationOutcome::Failure { reason },
        };
        FallbackReport { outcome, attempts }
    }

    fn invoke(
        &self,
        candidate: &ModelSpec,
        request: &GenerationRequest,
        mime_type: &str,
    ) -> Result<Vec<u8>> {
        let provider = self
            .providers
            .get(&candidate.provider)
            .ok_or_else(|| anyhow!("provider '{}' is not registered", candidate.provider))?;
        let generated = provider.invoke(&ImageInvocation {
            credential: &request.credential,
            model: &candidate.name,
            prompt: &request.prompt,
            image: &request.input_image,
            mime_type,
        })?;
        generated
            .map(|image| image.bytes)
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| anyhow!("No image in response"))
    }

    fn emit_failure(&self, candidate: &ModelSpec, error: &str) {
        let (Some(events), Some(stage)) = (self.events, self.stage) else {
            return;
        };
        let payload: EventPayload = map_object(json!({
            "model": candidate.name,
            "provider": candidate.provider,
            "error": Value::String(error.to_string()),
        }));
        if let Err(err) = events.emit_stage(EventKind::ModelAttemptFailed, stage, payload) {
            tracing::warn!(error = %err, "failed to write model_attempt_failed event");
        }
    }
}

fn exhausted_reason(attempts: &[Attempt]) -> String {
    let Some(last) = attempts.last() else {
        return "No models available for this stage".to_string();
    };
    let tried = attempts
        .iter()
        .map(|attempt| attempt.model.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!("Tried models: {tried}. Last error: {}", last.error)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use studio_contracts::models::Capability;

    use super::*;
    use crate::providers::fakes::{Reply, ScriptedModel, Shared};

    fn spec(name: &str) -> ModelSpec {
        ModelSpec::new(name, "fake", &[Capability::Portrait])
    }

    fn request(candidates: Vec<ModelSpec>) -> GenerationRequest {
        GenerationRequest {
            credential: "key".to_string(),
            input_image: vec![0xFF, 0xD8, 0xFF, 1],
            prompt: "portrait".to_string(),
            candidates,
        }
    }

    fn registry(model: &Arc<ScriptedModel>) -> ImageProviderRegistry {
        let mut providers = ImageProviderRegistry::new();
        providers.register(Shared(Arc::clone(model)));
        providers
    }

    #[test]
    fn stops_at_first_success_after_k_failures() {
        let model = Arc::new(
            ScriptedModel::new("fake")
                .script("a", vec![Reply::Error("404 not found")])
                .script("b", vec![Reply::TextOnly])
                .script("c", vec![Reply::Image(vec![7])])
                .script("d", vec![Reply::Image(vec![8])]),
        );
        let providers = registry(&model);
        let report = FallbackSelector::new(&providers, Duration::ZERO).run(
            &request(vec![spec("a"), spec("b"), spec("c"), spec("d")]),
            FallbackPolicy::DegradeToInput,
        );

        assert_eq!(model.call_models(), vec!["a", "b", "c"]);
        assert_eq!(report.outcome.model(), Some("c"));
        assert_eq!(report.outcome.image(), Some(&[7u8][..]));
        assert_eq!(report.tried_models(), vec!["a", "b"]);
        assert_eq!(report.attempts[1].error, "No image in response");
    }

    #[test]
    fn all_failing_degrades_to_input_bytes() {
        let model = Arc::new(ScriptedModel::new("fake").with_default(Reply::Error("quota exceeded")));
        let providers = registry(&model);
        let req = request(vec![spec("a"), spec("b")]);
        let report = FallbackSelector::new(&providers, Duration::ZERO)
            .run(&req, FallbackPolicy::DegradeToInput);

        assert!(report.outcome.is_degraded());
        assert_eq!(report.outcome.image(), Some(req.input_image.as_slice()));
        assert_eq!(
            report.outcome.reason(),
            Some("Tried models: a, b. Last error: quota exceeded")
        );
    }

    #[test]
    fn fail_policy_returns_failure_without_image() {
        let model = Arc::new(ScriptedModel::new("fake").with_default(Reply::TextOnly));
        let providers = registry(&model);
        let report = FallbackSelector::new(&providers, Duration::ZERO)
            .run(&request(vec![spec("a")]), FallbackPolicy::Fail);
        assert!(report.outcome.image().is_none());
        assert_eq!(report.attempts.len(), 1);
    }

    #[test]
    fn empty_candidates_fall_back_without_calls() {
        let model = Arc::new(ScriptedModel::new("fake"));
        let providers = registry(&model);
        let report = FallbackSelector::new(&providers, Duration::ZERO)
            .run(&request(Vec::new()), FallbackPolicy::DegradeToInput);
        assert!(model.call_models().is_empty());
        assert!(report.attempts.is_empty());
        assert_eq!(
            report.outcome.reason(),
            Some("No models available for this stage")
        );
    }

    #[test]
    fn empty_inline_payload_counts_as_no_image() {
        let model = Arc::new(
            ScriptedModel::new("fake")
                .script("a", vec![Reply::Image(Vec::new())])
                .script("b", vec![Reply::Image(vec![1])]),
        );
        let providers = registry(&model);
        let report = FallbackSelector::new(&providers, Duration::ZERO)
            .run(&request(vec![spec("a"), spec("b")]), FallbackPolicy::Fail);
        assert_eq!(report.outcome.model(), Some("b"));
    }

    #[test]
    fn unregistered_provider_is_a_failed_attempt() {
        let providers = ImageProviderRegistry::new();
        let report = FallbackSelector::new(&providers, Duration::ZERO)
            .run(&request(vec![spec("a")]), FallbackPolicy::Fail);
        assert_eq!(report.attempts.len(), 1);
        assert!(report.attempts[0].error.contains("not registered"));
    }

    #[test]
    fn failed_attempts_are_written_as_events() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events = EventWriter::new(temp.path().join("events.jsonl"), "s");
        let model = Arc::new(ScriptedModel::new("fake").with_default(Reply::Error("boom")));
        let providers = registry(&model);
        FallbackSelector::new(&providers, Duration::ZERO)
            .with_events(Some(&events), PipelineStage::Face)
            .run(&request(vec![spec("a"), spec("b")]), FallbackPolicy::Fail);

        let content = std::fs::read_to_string(events.path())?;
        let lines: Vec<Value> = content
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "model_attempt_failed");
        assert_eq!(lines[1]["model"], "b");
        assert_eq!(lines[1]["stage"], "face");
        Ok(())
    }
}
