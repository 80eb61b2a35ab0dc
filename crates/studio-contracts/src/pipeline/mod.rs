mod assembly;
mod dataset;
mod motion;
mod outcome;
pub mod prompts;
mod stage;
mod state;

pub use assembly::{
    build_bundle, AssemblyAssets, AssemblyBundle, AssemblyDownloads, AssemblyOption, NamedAsset,
    ASSEMBLY_OPTIONS, LOCAL_FFMPEG_COMMAND,
};
pub use dataset::{
    variations_for, DatasetItem, Variation, DEFAULT_DATASET_COUNT, MAX_DATASET_COUNT, VARIATIONS,
};
pub use motion::{
    ExternalTool, MotionOutcome, MotionType, EXTERNAL_VIDEO_TOOLS, MOTION_SUGGESTION,
};
pub use outcome::{Attempt, GenerationOutcome, GenerationRequest};
pub use stage::PipelineStage;
pub use state::{PipelineState, StateError, VoiceTrack};
