use std::thread;

use studio_contracts::models::Capability;
use studio_contracts::pipeline::prompts::{dataset_prompt, DATASET_PROBE_PROMPT};
use studio_contracts::pipeline::{
    variations_for, DatasetItem, GenerationOutcome, GenerationRequest, PipelineStage,
};

use super::{StageContext, StageError};
use crate::fallback::FallbackPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetOutput {
    pub items: Vec<DatasetItem>,
    pub model: Option<String>,
    pub degraded: bool,
    pub message: String,
    pub note: Option<String>,
}

/// Up to `count` identity-preserving variations of `image`.
///
/// A probe call picks the model; its image becomes the first variation and
/// the rest use that model alone. Failed variations are left out. With no
/// working model every variation carries the original bytes.
pub fn run_dataset(
    ctx: &StageContext<'_>,
    image: &[u8],
    count: usize,
) -> Result<DatasetOutput, StageError> {
    let key = ctx.require_key("API key and image required")?;
    if image.is_empty() {
        return Err(StageError::Validation("API key and image required".to_string()));
    }

    let variations = variations_for(count);
    let Some((first, rest)) = variations.split_first() else {
        return Ok(DatasetOutput {
            items: Vec::new(),
            model: None,
            degraded: false,
            message: "Generated 0 dataset images".to_string(),
            note: None,
        });
    };

    let plan = ctx.selector.candidates(None, Capability::Dataset);
    let probe = ctx
        .fallback(ctx.config.fallback_delay, PipelineStage::Dataset)
        .run(
            &GenerationRequest {
                credential: key.to_string(),
                input_image: image.to_vec(),
                prompt: DATASET_PROBE_PROMPT.to_string(),
                candidates: plan.models.clone(),
            },
            FallbackPolicy::Fail,
        );

    let (working, probe_image) = match probe.outcome {
        GenerationOutcome::Success { model, image } => (model, image),
        other => {
            let reason = other.reason().unwrap_or_default().to_string();
            tracing::warn!(%reason, "no dataset model available; returning original image");
            return Ok(DatasetOutput {
                items: variations
                    .iter()
                    .map(|variation| DatasetItem::new(variation.id, variation.name, image.to_vec()))
                    .collect(),
                model: None,
                degraded: true,
                message: "Using original image (image generation not available with your API key)"
                    .to_string(),
                note: Some(format!(
                    "Your Gemini API key does not have access to image generation models. {reason}"
                )),
            });
        }
    };

    let mut items = vec![DatasetItem::new(first.id, first.name, probe_image)];
    let pinned: Vec<_> = plan
        .models
        .into_iter()
        .filter(|model| model.name == working)
        .collect();
    let selector = ctx.fallback(ctx.config.fallback_delay, PipelineStage::Dataset);

    for variation in rest {
        if !ctx.config.dataset_delay.is_zero() {
            thread::sleep(ctx.config.dataset_delay);
        }
        let report = selector.run(
            &GenerationRequest {
                credential: key.to_string(),
                input_image: image.to_vec(),
                prompt: dataset_prompt(variation),
                candidates: pinned.clone(),
            },
            FallbackPolicy::Fail,
        );
        match report.outcome.into_image() {
            Some(generated) => items.push(DatasetItem::new(variation.id, variation.name, generated)),
            None => tracing::warn!(variation = variation.name, "dataset variation dropped"),
        }
    }

    Ok(DatasetOutput {
        message: format!(
            "Generated {} dataset images (using {working})",
            items.len()
        ),
        items,
        model: Some(working),
        degraded: false,
        note: None,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use studio_contracts::models::ModelSelector;
    use studio_contracts::pipeline::MAX_DATASET_COUNT;

    use super::*;
    use crate::dryrun::DryrunVideoModel;
    use crate::providers::fakes::{Reply, ScriptedModel};
    use crate::stages::testing;

    fn run(count: usize, model: &Arc<ScriptedModel>) -> Result<DatasetOutput, StageError> {
        let session = testing::session("key");
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
        run_dataset(&ctx, &[1, 2, 3], count)
    }

    #[test]
    fn probe_image_is_first_and_rest_use_working_model() {
        let model = Arc::new(
            ScriptedModel::new("fake")
                .script("m1", vec![Reply::Error("404")])
                .with_default(Reply::Image(vec![7])),
        );
        let output = run(3, &model).unwrap();
        assert_eq!(model.call_models(), vec!["m1", "m2", "m2", "m2"]);
        let ids: Vec<u32> = output.items.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(output.model.as_deref(), Some("m2"));
        assert_eq!(output.message, "Generated 3 dataset images (using m2)");
    }

    #[test]
    fn failed_variation_is_omitted() {
        let model = Arc::new(ScriptedModel::new("fake").script(
            "m1",
            vec![
                Reply::Image(vec![1]),
                Reply::Image(vec![2]),
                Reply::TextOnly,
                Reply::Image(vec![4]),
            ],
        ));
        let output = run(4, &model).unwrap();
        let ids: Vec<u32> = output.items.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
        assert!(output.items.len() <= 4);
    }

    #[test]
    fn no_working_model_returns_original_for_each_variation() {
        let model = Arc::new(ScriptedModel::new("fake").with_default(Reply::Error("quota")));
        let output = run(3, &model).unwrap();
        assert!(output.degraded);
        assert_eq!(output.items.len(), 3);
        assert!(output.items.iter().all(|item| item.image == vec![1, 2, 3]));
        assert_eq!(output.items[1].label, "casual_3/4");
    }

    #[test]
    fn count_is_clamped_and_zero_is_empty() {
        let model = Arc::new(ScriptedModel::new("fake").with_default(Reply::Image(vec![1])));
        assert_eq!(run(50, &model).unwrap().items.len(), MAX_DATASET_COUNT);

        let quiet = Arc::new(ScriptedModel::new("fake"));
        let output = run(0, &quiet).unwrap();
        assert!(output.items.is_empty());
        assert!(quiet.call_models().is_empty());
    }
}
