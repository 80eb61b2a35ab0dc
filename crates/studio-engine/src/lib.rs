//! Stage handlers, model fallback and provider clients for the clone studio
//! pipeline. Everything here is synchronous; callers on an async runtime run
//! it on a blocking thread.

use std::env;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Response as HttpResponse;
use serde_json::{Map, Value};

pub mod backends;
pub mod config;
pub mod dryrun;
pub mod fallback;
pub mod gemini;
pub mod pipeline;
pub mod providers;
pub mod stages;
pub mod storage;
pub mod video;

pub use backends::{Backends, DryrunBackends, LiveBackends, StageKit};
pub use config::EngineConfig;
pub use fallback::{FallbackPolicy, FallbackReport, FallbackSelector};
pub use pipeline::{RunOptions, StudioRun};
pub use providers::{GeneratedImage, ImageInvocation, ImageModel, ImageProviderRegistry};
pub use stages::{StageContext, StageError};
pub use storage::{
    MemoryStore, ObjectStore, StorageHandoff, StoredItem, StoredObject, SupabaseStore,
};
pub use video::{VideoModel, VideoOperation, VideoPayload, VideoRequest};

pub(crate) fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Flattens an error chain into one line for user-facing messages.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// MIME type of an encoded image, defaulting to JPEG like the browser upload.
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg")
}

/// File extension for an encoded image, defaulting to `jpg`.
pub fn sniff_image_extension(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("jpg")
}
