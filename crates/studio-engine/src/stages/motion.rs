use std::thread;

use anyhow::anyhow;
use studio_contracts::models::Capability;
use studio_contracts::pipeline::{
    ExternalTool, MotionOutcome, MotionType, EXTERNAL_VIDEO_TOOLS, MOTION_SUGGESTION,
};

use super::{StageContext, StageError};
use crate::video::{VideoPayload, VideoRequest};
use crate::{error_chain_text, sniff_image_mime};

pub const MOTION_INTERNAL_SUGGESTION: &str =
    "VEO may not be available with your API key. Use external video tools.";

static PAID_TIER_TOOLS: [ExternalTool; 2] = [EXTERNAL_VIDEO_TOOLS[0], EXTERNAL_VIDEO_TOOLS[1]];
static ALL_TOOLS: [ExternalTool; 3] = EXTERNAL_VIDEO_TOOLS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionOutput {
    pub outcome: MotionOutcome,
    pub model: String,
    pub motion_type: MotionType,
    pub message: String,
    pub suggestion: Option<&'static str>,
}

impl MotionOutput {
    pub fn operation(&self) -> Option<&str> {
        match &self.outcome {
            MotionOutcome::TimedOut { operation, .. } | MotionOutcome::Empty { operation } => {
                Some(operation)
            }
            MotionOutcome::Completed { .. } => None,
        }
    }
}

/// Starts an image-to-video job and polls it until it finishes or the poll
/// budget runs out. Running out is a `TimedOut` outcome; the remote job is
/// left alone.
pub fn run_motion(
    ctx: &StageContext<'_>,
    image: &[u8],
    motion_type: MotionType,
) -> Result<MotionOutput, StageError> {
    let key = ctx.require_key("API key and image required")?;
    if image.is_empty() {
        return Err(StageError::Validation("API key and image required".to_string()));
    }
    let plan = ctx.selector.candidates(None, Capability::Motion);
    let Some(model) = plan.first() else {
        return Err(classify_motion_error(anyhow!("video model not found")));
    };

    tracing::info!(model = %model.name, motion = %motion_type, "starting video generation");
    let mut operation = ctx
        .video
        .start(&VideoRequest {
            credential: key,
            model: &model.name,
            prompt: motion_type.prompt(),
            image,
            mime_type: sniff_image_mime(image),
        })
        .map_err(classify_motion_error)?;

    let interval = ctx.config.motion_poll_interval;
    let max_polls = ctx.config.motion_max_polls();
    let mut polls = 0u32;
    while !operation.done {
        if polls >= max_polls {
            tracing::warn!(operation = %operation.name, polls, "video generation still running at poll ceiling");
            let outcome = MotionOutcome::TimedOut {
                operation: operation.name,
                waited: interval * polls,
            };
            return Ok(finish(outcome, &model.name, motion_type));
        }
        thread::sleep(interval);
        polls += 1;
        operation = ctx
            .video
            .poll(key, &operation.name)
            .map_err(classify_motion_error)?;
        tracing::debug!(operation = %operation.name, polls, done = operation.done, "polled video operation");
    }

    if let Some(error) = operation.error {
        return Err(classify_motion_error(anyhow!(error)));
    }
    let outcome = match operation.video {
        Some(VideoPayload::Inline { bytes, mime_type }) => MotionOutcome::Completed {
            video: bytes,
            mime_type,
        },
        Some(VideoPayload::Remote { uri, mime_type }) => MotionOutcome::Completed {
            video: ctx
                .video
                .download(key, &uri)
                .map_err(classify_motion_error)?,
            mime_type,
        },
        None => MotionOutcome::Empty {
            operation: operation.name,
        },
    };
    Ok(finish(outcome, &model.name, motion_type))
}

fn finish(outcome: MotionOutcome, model: &str, motion_type: MotionType) -> MotionOutput {
    let suggestion = match outcome {
        MotionOutcome::Completed { .. } => None,
        _ => Some(MOTION_SUGGESTION),
    };
    MotionOutput {
        message: outcome.message(),
        outcome,
        model: model.to_string(),
        motion_type,
        suggestion,
    }
}

/// Maps a video provider failure onto the error the caller sees.
pub fn classify_motion_error(err: anyhow::Error) -> StageError {
    let text = error_chain_text(&err, 500).to_ascii_lowercase();
    if text.contains("not found") || text.contains("404") {
        return StageError::ModelUnavailable {
            message: "VEO model not available".to_string(),
            suggestion:
                "VEO 3.1 requires API access. Use Kling AI, Runway, or Pika Labs for video generation."
                    .to_string(),
            tools: &ALL_TOOLS,
        };
    }
    if text.contains("permission") || text.contains("quota") || text.contains("403") {
        return StageError::AccessDenied {
            message: "VEO access requires paid API tier".to_string(),
            suggestion: "VEO is in paid preview. Use external video tools for now.".to_string(),
            tools: &PAID_TIER_TOOLS,
        };
    }
    StageError::Internal(err)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use studio_contracts::models::ModelSelector;

    use super::*;
    use crate::config::EngineConfig;
    use crate::providers::ImageProviderRegistry;
    use crate::stages::testing;
    use crate::video::fakes::{finished, pending, ScriptedVideo};
    use crate::video::VideoModel;

    fn run(video: &dyn VideoModel, config: &EngineConfig) -> Result<MotionOutput, StageError> {
        let session = testing::session("key");
        let providers = ImageProviderRegistry::new();
        let selector = ModelSelector::new(Some(testing::registry()));
        let ctx = StageContext {
            session: &session,
            providers: &providers,
            video,
            selector: &selector,
            config,
            events: None,
        };
        run_motion(&ctx, &[1, 2], MotionType::Walking)
    }

    fn fast_config(ceiling_ms: u64) -> EngineConfig {
        EngineConfig {
            motion_poll_interval: Duration::ZERO,
            motion_poll_ceiling: Duration::from_millis(ceiling_ms),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn inline_video_completes() {
        let video = ScriptedVideo::new(vec![
            pending(),
            finished(Some(VideoPayload::Inline {
                bytes: b"mp4".to_vec(),
                mime_type: "video/mp4".to_string(),
            })),
        ]);
        let output = run(&video, &fast_config(10)).unwrap();
        assert_eq!(output.outcome.video(), Some(&b"mp4"[..]));
        assert_eq!(output.message, "Motion video generated with VEO 3.1!");
        assert!(output.suggestion.is_none());
        assert_eq!(video.polls(), 2);
    }

    #[test]
    fn remote_video_is_downloaded() {
        let video = ScriptedVideo::new(vec![finished(Some(VideoPayload::Remote {
            uri: "https://files.test/v.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
        }))]);
        let output = run(&video, &fast_config(10)).unwrap();
        assert_eq!(output.outcome.video(), Some(&b"remote-video"[..]));
        assert_eq!(
            video.downloads.lock().unwrap().as_slice(),
            ["https://files.test/v.mp4".to_string()]
        );
    }

    #[test]
    fn ceiling_yields_timed_out_not_error() {
        let video = ScriptedVideo::new(Vec::new());
        let output = run(&video, &fast_config(3)).unwrap();
        assert!(matches!(output.outcome, MotionOutcome::TimedOut { .. }));
        assert_eq!(output.operation(), Some("operations/op-1"));
        assert_eq!(output.suggestion, Some(MOTION_SUGGESTION));
        assert_eq!(video.polls(), 3);
    }

    #[test]
    fn done_without_video_is_empty() {
        let video = ScriptedVideo::new(vec![finished(None)]);
        let output = run(&video, &fast_config(10)).unwrap();
        assert!(matches!(output.outcome, MotionOutcome::Empty { .. }));
        assert_eq!(
            output.message,
            "Video generation completed but no video returned"
        );
    }

    #[test]
    fn start_errors_are_classified() {
        let not_found = run(&ScriptedVideo::failing("Veo request failed (404): model not found"), &fast_config(1));
        match not_found {
            Err(err @ StageError::ModelUnavailable { .. }) => {
                assert_eq!(err.external_tools().len(), 3);
                assert!(err.suggestion().is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }

        let quota = run(&ScriptedVideo::failing("RESOURCE_EXHAUSTED: quota exceeded"), &fast_config(1));
        match quota {
            Err(err @ StageError::AccessDenied { .. }) => {
                assert_eq!(err.external_tools().len(), 2);
            }
            other => panic!("unexpected: {other:?}"),
        }

        let other = run(&ScriptedVideo::failing("connection reset"), &fast_config(1));
        assert!(matches!(other, Err(StageError::Internal(_))));
    }

    #[test]
    fn missing_image_is_validation() {
        let session = testing::session("key");
        let providers = ImageProviderRegistry::new();
        let selector = ModelSelector::new(Some(testing::registry()));
        let config = fast_config(1);
        let video = ScriptedVideo::new(Vec::new());
        let ctx = StageContext {
            session: &session,
            providers: &providers,
            video: &video,
            selector: &selector,
            config: &config,
            events: None,
        };
        assert!(matches!(
            run_motion(&ctx, &[], MotionType::Subtle),
            Err(StageError::Validation(_))
        ));
        assert_eq!(video.polls(), 0);
    }
}
