use studio_contracts::pipeline::{build_bundle, AssemblyBundle};

pub const ASSEMBLY_MESSAGE: &str = "Assets ready for assembly";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyInput {
    pub images: Vec<Vec<u8>>,
    pub audio: Option<Vec<u8>>,
    pub video: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyOutput {
    pub bundle: AssemblyBundle,
    pub message: &'static str,
}

/// Packages whatever exists for manual editing. Never fails; missing pieces
/// just show up as absent in the asset summary.
pub fn run_assembly(input: AssemblyInput) -> AssemblyOutput {
    let audio = input.audio.filter(|bytes| !bytes.is_empty());
    let video = input.video.filter(|bytes| !bytes.is_empty());
    AssemblyOutput {
        bundle: build_bundle(input.images, audio, video),
        message: ASSEMBLY_MESSAGE,
    }
}
