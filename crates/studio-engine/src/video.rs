use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::response_json_or_error;

pub const VIDEO_ASPECT_RATIO: &str = "9:16";

#[derive(Debug, Clone, Copy)]
pub struct VideoRequest<'a> {
    pub credential: &'a str,
    pub model: &'a str,
    pub prompt: &'a str,
    pub image: &'a [u8],
    pub mime_type: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoPayload {
    Inline { bytes: Vec<u8>, mime_type: String },
    Remote { uri: String, mime_type: String },
}

/// Snapshot of a long-running video job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOperation {
    pub name: String,
    pub done: bool,
    pub video: Option<VideoPayload>,
    pub error: Option<String>,
}

/// An asynchronous image-to-video backend: start a job, poll it by name, and
/// fetch the finished file when the result is a link.
pub trait VideoModel: Send + Sync {
    fn name(&self) -> &str;
    fn start(&self, request: &VideoRequest<'_>) -> Result<VideoOperation>;
    fn poll(&self, credential: &str, operation: &str) -> Result<VideoOperation>;
    fn download(&self, credential: &str, uri: &str) -> Result<Vec<u8>>;
}

/// Veo through the Gemini `predictLongRunning` endpoint.
pub struct VeoVideoModel {
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl VeoVideoModel {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.gemini_api_base.trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn build_payload(request: &VideoRequest<'_>) -> Value {
        json!({
            "instances": [{
                "prompt": request.prompt,
                "image": {
                    "bytesBase64Encoded": BASE64.encode(request.image),
                    "mimeType": request.mime_type,
                }
            }],
            "parameters": {
                "aspectRatio": VIDEO_ASPECT_RATIO,
                "sampleCount": 1,
            }
        })
    }
}

impl VideoModel for VeoVideoModel {
    fn name(&self) -> &str {
        "gemini"
    }

    fn start(&self, request: &VideoRequest<'_>) -> Result<VideoOperation> {
        if request.credential.trim().is_empty() {
            bail!("Gemini API key missing");
        }
        let endpoint = format!(
            "{}/models/{}:predictLongRunning",
            self.api_base,
            request.model.trim().trim_start_matches("models/")
        );
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", request.credential.trim())
            .timeout(self.timeout)
            .json(&Self::build_payload(request))
            .send()
            .with_context(|| format!("Veo start request failed ({})", request.model))?;
        let payload = response_json_or_error("Veo", response)?;
        parse_operation(&payload)
    }

    fn poll(&self, credential: &str, operation: &str) -> Result<VideoOperation> {
        let endpoint = format!("{}/{}", self.api_base, operation.trim_start_matches('/'));
        let response = self
            .http
            .get(&endpoint)
            .header("x-goog-api-key", credential.trim())
            .timeout(self.timeout)
            .send()
            .with_context(|| format!("Veo poll request failed ({operation})"))?;
        let payload = response_json_or_error("Veo poll", response)?;
        parse_operation(&payload)
    }

    fn download(&self, credential: &str, uri: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(uri)
            .header("x-goog-api-key", credential.trim())
            .timeout(self.timeout)
            .send()
            .with_context(|| format!("Veo video download failed ({uri})"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("Veo video download failed ({})", status.as_u16());
        }
        let bytes = response
            .bytes()
            .context("Veo video download body read failed")?;
        Ok(bytes.to_vec())
    }
}

pub(crate) fn parse_operation(payload: &Value) -> Result<VideoOperation> {
    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let done = payload.get("done").and_then(Value::as_bool).unwrap_or(false);
    let error = payload.get("error").map(|error| {
        error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string())
    });
    if name.is_empty() && !done {
        bail!("Veo returned no operation name: {payload}");
    }
    let video = if done {
        extract_video(payload.get("response").unwrap_or(&Value::Null))?
    } else {
        None
    };
    Ok(VideoOperation {
        name,
        done,
        video,
        error,
    })
}

fn extract_video(response: &Value) -> Result<Option<VideoPayload>> {
    let sample = response
        .pointer("/generateVideoResponse/generatedSamples/0/video")
        .or_else(|| response.pointer("/generatedVideos/0/video"))
        .or_else(|| response.pointer("/videos/0"));
    let Some(video) = sample else {
        return Ok(None);
    };
    let mime_type = video
        .get("mimeType")
        .and_then(Value::as_str)
        .unwrap_or("video/mp4")
        .to_string();
    if let Some(encoded) = video
        .get("bytesBase64Encoded")
        .or_else(|| video.get("videoBytes"))
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
    {
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .context("Veo video base64 decode failed")?;
        return Ok(Some(VideoPayload::Inline { bytes, mime_type }));
    }
    Ok(video
        .get("uri")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(|uri| VideoPayload::Remote {
            uri: uri.to_string(),
            mime_type,
        }))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_operation_has_no_video() -> Result<()> {
        let op = parse_operation(&json!({ "name": "models/veo/operations/abc" }))?;
        assert_eq!(op.name, "models/veo/operations/abc");
        assert!(!op.done);
        assert!(op.video.is_none());
        Ok(())
    }

    #[test]
    fn finished_operation_with_link() -> Result<()> {
        let op = parse_operation(&json!({
            "name": "ops/1",
            "done": true,
            "response": {
                "generateVideoResponse": {
                    "generatedSamples": [{ "video": { "uri": "https://files.test/v.mp4" } }]
                }
            }
        }))?;
        assert_eq!(
            op.video,
            Some(VideoPayload::Remote {
                uri: "https://files.test/v.mp4".to_string(),
                mime_type: "video/mp4".to_string(),
            })
        );
        Ok(())
    }

    #[test]
    fn finished_operation_with_inline_bytes() -> Result<()> {
        let op = parse_operation(&json!({
            "name": "ops/2",
            "done": true,
            "response": {
                "generatedVideos": [{
                    "video": { "bytesBase64Encoded": BASE64.encode(b"mp4"), "mimeType": "video/mp4" }
                }]
            }
        }))?;
        assert_eq!(
            op.video,
            Some(VideoPayload::Inline {
                bytes: b"mp4".to_vec(),
                mime_type: "video/mp4".to_string(),
            })
        );
        Ok(())
    }

    #[test]
    fn done_without_samples_is_empty() -> Result<()> {
        let op = parse_operation(&json!({ "name": "ops/3", "done": true, "response": {} }))?;
        assert!(op.done);
        assert!(op.video.is_none());
        Ok(())
    }

    #[test]
    fn operation_error_message_is_kept() -> Result<()> {
        let op = parse_operation(&json!({
            "name": "ops/4",
            "done": true,
            "error": { "code": 429, "message": "quota exceeded" }
        }))?;
        assert_eq!(op.error.as_deref(), Some("quota exceeded"));
        Ok(())
    }

    #[test]
    fn start_payload_is_portrait_single_sample() {
        let image = [1u8];
        let payload = VeoVideoModel::build_payload(&VideoRequest {
            credential: "k",
            model: "veo-3.1-generate-preview",
            prompt: "walk",
            image: &image,
            mime_type: "image/png",
        });
        assert_eq!(payload["parameters"]["aspectRatio"], "9:16");
        assert_eq!(payload["parameters"]["sampleCount"], 1);
        assert_eq!(payload["instances"][0]["image"]["mimeType"], "image/png");
    }
}
