use serde::Serialize;

pub const LOCAL_FFMPEG_COMMAND: &str =
    "ffmpeg -framerate 1/4 -i image_%d.jpg -i audio.mp3 -c:v libx264 -pix_fmt yuv420p -shortest output.mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyAssets {
    pub has_video: bool,
    pub has_audio: bool,
    pub image_count: usize,
}

/// One way for a person to put the assets together by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyOption {
    pub name: &'static str,
    #[serde(skip_serializing_if = "no_steps")]
    pub steps: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<&'static str>,
}

fn no_steps(steps: &&'static [&'static str]) -> bool {
    steps.is_empty()
}

pub const ASSEMBLY_OPTIONS: [AssemblyOption; 3] = [
    AssemblyOption {
        name: "CapCut (Recommended)",
        steps: &[
            "Download all images below",
            "Open CapCut (free app)",
            "Import images as slideshow",
            "Add Ken Burns effect (zoom/pan)",
            "Import audio file",
            "Export as MP4",
        ],
        command: None,
    },
    AssemblyOption {
        name: "Canva",
        steps: &[
            "Go to canva.com",
            "Create video project",
            "Upload images",
            "Add animations",
            "Add audio",
            "Download MP4",
        ],
        command: None,
    },
    AssemblyOption {
        name: "FFmpeg (Local)",
        steps: &[],
        command: Some(LOCAL_FFMPEG_COMMAND),
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedAsset {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssemblyDownloads {
    pub images: Vec<NamedAsset>,
    pub audio: Option<NamedAsset>,
    pub video: Option<NamedAsset>,
}

/// Download-ready description of whatever the earlier stages produced. No
/// media is encoded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyBundle {
    pub assets: AssemblyAssets,
    pub instructions: &'static [AssemblyOption],
    pub downloads: AssemblyDownloads,
}

pub fn build_bundle(
    images: Vec<Vec<u8>>,
    audio: Option<Vec<u8>>,
    video: Option<Vec<u8>>,
) -> AssemblyBundle {
    let assets = AssemblyAssets {
        has_video: video.is_some(),
        has_audio: audio.is_some(),
        image_count: images.len(),
    };
    let downloads = AssemblyDownloads {
        images: images
            .into_iter()
            .enumerate()
            .map(|(idx, data)| NamedAsset {
                name: format!("image_{}.jpg", idx + 1),
                data,
            })
            .collect(),
        audio: audio.map(|data| NamedAsset {
            name: "voiceover.mp3".to_string(),
            data,
        }),
        video: video.map(|data| NamedAsset {
            name: "motion.mp4".to_string(),
            data,
        }),
    };
    AssemblyBundle {
        assets,
        instructions: &ASSEMBLY_OPTIONS,
        downloads,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_names_images_from_one() {
        let bundle = build_bundle(vec![vec![1], vec![2]], None, Some(vec![9]));
        let names: Vec<&str> = bundle
            .downloads
            .images
            .iter()
            .map(|asset| asset.name.as_str())
            .collect();
        assert_eq!(names, vec!["image_1.jpg", "image_2.jpg"]);
        assert_eq!(
            bundle.assets,
            AssemblyAssets {
                has_video: true,
                has_audio: false,
                image_count: 2,
            }
        );
        assert_eq!(
            bundle.downloads.video.map(|asset| asset.name),
            Some("motion.mp4".to_string())
        );
    }

    #[test]
    fn empty_bundle_still_carries_instructions() {
        let bundle = build_bundle(Vec::new(), None, None);
        assert_eq!(bundle.assets.image_count, 0);
        assert_eq!(bundle.instructions.len(), 3);
        assert_eq!(bundle.instructions[2].command, Some(LOCAL_FFMPEG_COMMAND));
    }
}
