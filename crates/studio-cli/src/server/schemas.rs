//! Request and response bodies. Field names are camelCase on the wire and
//! binary payloads travel as standard base64.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use studio_contracts::pipeline::{AssemblyAssets, AssemblyOption, DatasetItem};

use super::error::ApiError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FaceRequest {
    pub api_key: Option<String>,
    pub image_base64: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetRequest {
    pub api_key: Option<String>,
    pub image_base64: Option<String>,
    pub count: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpscaleRequest {
    pub api_key: Option<String>,
    pub images: Vec<ImagePayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MotionRequest {
    pub api_key: Option<String>,
    pub image_base64: Option<String>,
    pub motion_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssemblyRequest {
    pub video_base64: Option<String>,
    pub audio_base64: Option<String>,
    pub images: Vec<ImagePayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageRequest {
    pub action: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub session_id: Option<String>,
    pub image_name: Option<String>,
    pub image_base64: Option<String>,
    pub images: Vec<ImagePayload>,
}

/// An image in a list: either a bare base64 string or an object carrying
/// its dataset id and name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ImagePayload {
    Bare(String),
    Entry {
        #[serde(default)]
        id: Option<u32>,
        #[serde(default)]
        name: Option<String>,
        image: String,
    },
}

impl ImagePayload {
    pub fn image(&self) -> &str {
        match self {
            ImagePayload::Bare(image) | ImagePayload::Entry { image, .. } => image,
        }
    }

    /// Decodes into a dataset item, filling a missing id with the list
    /// position and a missing name with `original_<position>`.
    pub fn into_item(self, position: usize) -> Result<DatasetItem, ApiError> {
        let bytes = decode_base64(self.image(), "images")?;
        let (id, name) = match self {
            ImagePayload::Bare(_) => (None, None),
            ImagePayload::Entry { id, name, .. } => (id, name),
        };
        let id = id.unwrap_or(position as u32);
        let name = name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("original_{position}"));
        Ok(DatasetItem::new(id, name, bytes))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceResponse {
    pub success: bool,
    pub step: u8,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub degraded: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImageEntry {
    pub id: u32,
    pub name: String,
    pub image: String,
}

impl From<&DatasetItem> for ImageEntry {
    fn from(item: &DatasetItem) -> Self {
        Self {
            id: item.id,
            name: item.label.clone(),
            image: encode_base64(&item.image),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSetResponse {
    pub success: bool,
    pub step: u8,
    pub images: Vec<ImageEntry>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub degraded: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<Vec<u32>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionResponse {
    pub success: bool,
    pub step: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub model: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadEntry {
    pub name: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct Downloads {
    pub images: Vec<DownloadEntry>,
    pub audio: Option<DownloadEntry>,
    pub video: Option<DownloadEntry>,
}

#[derive(Debug, Serialize)]
pub struct AssemblyResponse {
    pub success: bool,
    pub step: u8,
    pub message: &'static str,
    pub assets: AssemblyAssets,
    /// Hand-assembly options keyed `option1`, `option2`, ...
    pub instructions: BTreeMap<String, &'static AssemblyOption>,
    pub downloads: Downloads,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct StoredEntry {
    pub id: u32,
    pub name: String,
    pub url: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub images: Vec<StoredEntry>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ListedEntry {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub images: Vec<ListedEntry>,
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decodes standard base64, tolerating a `data:<mime>;base64,` prefix and
/// embedded whitespace.
pub fn decode_base64(raw: &str, field: &str) -> Result<Vec<u8>, ApiError> {
    let payload = match raw.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => raw,
    };
    let compact: String = payload.chars().filter(|ch| !ch.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|err| ApiError::bad_request(format!("{field} is not valid base64: {err}")))
}

/// A present, non-blank text field.
pub fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
