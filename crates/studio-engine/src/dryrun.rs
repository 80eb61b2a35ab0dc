use std::io::Cursor;

use anyhow::{bail, Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::providers::{GeneratedImage, ImageInvocation, ImageModel};
use crate::video::{VideoModel, VideoOperation, VideoRequest};

const DRYRUN_SIZE: u32 = 64;

/// Offline image model: a flat PNG whose color is a hash of the prompt and
/// the input, so the same call always yields the same bytes.
pub struct DryrunImageModel;

impl ImageModel for DryrunImageModel {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn invoke(&self, request: &ImageInvocation<'_>) -> Result<Option<GeneratedImage>> {
        let (r, g, b) = color_from_request(request.prompt, request.image);
        let mut image = RgbImage::new(DRYRUN_SIZE, DRYRUN_SIZE);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut encoded = Cursor::new(Vec::new());
        image
            .write_to(&mut encoded, ImageFormat::Png)
            .context("dryrun image encode failed")?;
        Ok(Some(GeneratedImage {
            bytes: encoded.into_inner(),
            mime_type: Some("image/png".to_string()),
        }))
    }
}

/// Offline video model: every job finishes immediately with no video.
pub struct DryrunVideoModel;

impl VideoModel for DryrunVideoModel {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn start(&self, request: &VideoRequest<'_>) -> Result<VideoOperation> {
        Ok(VideoOperation {
            name: format!("operations/dryrun-{}", short_id(request.prompt, request.image)),
            done: true,
            video: None,
            error: None,
        })
    }

    fn poll(&self, _credential: &str, operation: &str) -> Result<VideoOperation> {
        Ok(VideoOperation {
            name: operation.to_string(),
            done: true,
            video: None,
            error: None,
        })
    }

    fn download(&self, _credential: &str, uri: &str) -> Result<Vec<u8>> {
        bail!("dryrun has no remote video at {uri}")
    }
}

fn color_from_request(prompt: &str, image: &[u8]) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(image);
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn short_id(prompt: &str, image: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(image);
    hex::encode(&hasher.finalize()[..4])
}
