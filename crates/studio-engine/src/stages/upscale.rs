use std::thread;

use studio_contracts::models::Capability;
use studio_contracts::pipeline::prompts::UPSCALE_PROMPT;
use studio_contracts::pipeline::{DatasetItem, GenerationOutcome, GenerationRequest, PipelineStage};

use super::{StageContext, StageError};
use crate::fallback::FallbackPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpscaleOutput {
    /// Same length and order as the input.
    pub items: Vec<DatasetItem>,
    /// Ids whose bytes came back from a model.
    pub enhanced: Vec<u32>,
    pub model: Option<String>,
    pub degraded: bool,
    pub message: String,
}

/// Empty entries are passed through untouched; only an empty list is invalid.
pub fn run_upscale(
    ctx: &StageContext<'_>,
    items: Vec<DatasetItem>,
) -> Result<UpscaleOutput, StageError> {
    let key = ctx.require_key("API key and images required")?;
    if items.is_empty() {
        return Err(StageError::Validation("API key and images required".to_string()));
    }

    let plan = ctx.selector.candidates(None, Capability::Upscale);
    let selector = ctx.fallback(ctx.config.fallback_delay, PipelineStage::Upscale);
    let request = |image: &[u8], candidates| GenerationRequest {
        credential: key.to_string(),
        input_image: image.to_vec(),
        prompt: UPSCALE_PROMPT.to_string(),
        candidates,
    };

    let Some(probe_at) = items.iter().position(|item| !item.image.is_empty()) else {
        tracing::warn!("no upscale input carries image bytes; keeping originals");
        return Ok(keep_originals(items));
    };
    let probe = selector.run(
        &request(&items[probe_at].image, plan.models.clone()),
        FallbackPolicy::Fail,
    );
    let (working, probed) = match probe.outcome {
        GenerationOutcome::Success { model, image } => (model, image),
        other => {
            tracing::warn!(reason = other.reason().unwrap_or_default(), "no upscale model available; keeping originals");
            return Ok(keep_originals(items));
        }
    };

    let pinned: Vec<_> = plan
        .models
        .into_iter()
        .filter(|model| model.name == working)
        .collect();
    let mut probed = Some(probed);
    let mut enhanced = Vec::new();
    let mut out = Vec::with_capacity(items.len());

    for (position, item) in items.into_iter().enumerate() {
        let image = if position == probe_at {
            probed.take()
        } else if item.image.is_empty() {
            tracing::warn!(id = item.id, "upscale input has no image bytes; passing through");
            None
        } else {
            if !ctx.config.upscale_delay.is_zero() {
                thread::sleep(ctx.config.upscale_delay);
            }
            let report = selector.run(&request(&item.image, pinned.clone()), FallbackPolicy::Fail);
            let image = report.outcome.into_image();
            if image.is_none() {
                tracing::warn!(id = item.id, "upscale failed; keeping original");
            }
            image
        };
        match image {
            Some(image) => {
                enhanced.push(item.id);
                out.push(item.with_image(image));
            }
            None => out.push(item),
        }
    }

    Ok(UpscaleOutput {
        message: format!("Enhanced {} images (using {working})", out.len()),
        items: out,
        enhanced,
        model: Some(working),
        degraded: false,
    })
}

fn keep_originals(items: Vec<DatasetItem>) -> UpscaleOutput {
    UpscaleOutput {
        items,
        enhanced: Vec::new(),
        model: None,
        degraded: true,
        message: "Using original images (enhancement not available with your API key)".to_string(),
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

    fn items() -> Vec<DatasetItem> {
        (1..=4)
            .map(|id| DatasetItem::new(id, format!("v{id}"), vec![id as u8]))
            .collect()
    }

    fn run(
        key: &str,
        input: Vec<DatasetItem>,
        model: &Arc<ScriptedModel>,
    ) -> Result<UpscaleOutput, StageError> {
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
        run_upscale(&ctx, input)
    }

    #[test]
    fn failing_item_keeps_original_bytes_and_position() {
        let model = Arc::new(ScriptedModel::new("fake").script(
            "m1",
            vec![
                Reply::Image(vec![10]),
                Reply::Image(vec![20]),
                Reply::Error("500 internal"),
                Reply::Image(vec![40]),
            ],
        ));
        let output = run("key", items(), &model).unwrap();
        let bytes: Vec<Vec<u8>> = output.items.iter().map(|item| item.image.clone()).collect();
        assert_eq!(bytes, vec![vec![10], vec![20], vec![3], vec![40]]);
        let ids: Vec<u32> = output.items.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(output.enhanced, vec![1, 2, 4]);
    }

    #[test]
    fn empty_entries_pass_through_without_a_call() {
        let model = Arc::new(ScriptedModel::new("fake").script(
            "m1",
            vec![Reply::Image(vec![10]), Reply::Image(vec![30])],
        ));
        let input = vec![
            DatasetItem::new(1, "v1", vec![1]),
            DatasetItem::new(2, "v2", Vec::new()),
            DatasetItem::new(3, "v3", vec![3]),
        ];
        let output = run("key", input, &model).unwrap();
        assert_eq!(output.items.len(), 3);
        assert_eq!(output.items[1], DatasetItem::new(2, "v2", Vec::new()));
        assert_eq!(output.items[2].image, vec![30]);
        assert_eq!(output.enhanced, vec![1, 3]);
        assert_eq!(model.call_models(), vec!["m1", "m1"]);
    }

    #[test]
    fn leading_empty_entry_does_not_become_the_first_attempt() {
        let model = Arc::new(ScriptedModel::new("fake").with_default(Reply::Image(vec![9])));
        let input = vec![
            DatasetItem::new(1, "v1", Vec::new()),
            DatasetItem::new(2, "v2", vec![2]),
        ];
        let output = run("key", input, &model).unwrap();
        assert!(!output.degraded);
        assert!(output.items[0].image.is_empty());
        assert_eq!(output.items[1].image, vec![9]);
        assert_eq!(output.enhanced, vec![2]);
        assert_eq!(model.call_models().len(), 1);
    }

    #[test]
    fn no_working_model_returns_all_originals() {
        let model = Arc::new(ScriptedModel::new("fake").with_default(Reply::TextOnly));
        let output = run("key", items(), &model).unwrap();
        assert!(output.degraded);
        assert_eq!(output.items, items());
        assert!(output.enhanced.is_empty());
        assert_eq!(model.call_models(), vec!["m1", "m2"]);
    }

    #[test]
    fn empty_list_or_key_is_rejected_before_calls() {
        let model = Arc::new(ScriptedModel::new("fake").with_default(Reply::Image(vec![1])));
        assert!(matches!(
            run("key", Vec::new(), &model),
            Err(StageError::Validation(_))
        ));
        assert!(matches!(
            run("", items(), &model),
            Err(StageError::Validation(_))
        ));
        assert!(model.call_models().is_empty());
    }
}
