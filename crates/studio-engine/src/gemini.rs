use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::providers::{GeneratedImage, ImageInvocation, ImageModel};
use crate::response_json_or_error;

/// Image-to-image calls against the Gemini `generateContent` API. The key is
/// per request, never read from the environment.
pub struct GeminiImageModel {
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiImageModel {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.gemini_api_base.trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &ImageInvocation<'_>) -> Value {
        json!({
            "contents": [{
                "parts": [
                    { "text": request.prompt },
                    {
                        "inlineData": {
                            "mimeType": request.mime_type,
                            "data": BASE64.encode(request.image),
                        }
                    }
                ]
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            }
        })
    }
}

impl ImageModel for GeminiImageModel {
    fn name(&self) -> &str {
        "gemini"
    }

    fn invoke(&self, request: &ImageInvocation<'_>) -> Result<Option<GeneratedImage>> {
        if request.credential.trim().is_empty() {
            bail!("Gemini API key missing");
        }
        let endpoint = self.endpoint_for_model(request.model);
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", request.credential.trim())
            .timeout(self.timeout)
            .json(&Self::build_payload(request))
            .send()
            .with_context(|| format!("Gemini request failed ({})", request.model))?;
        let payload = response_json_or_error("Gemini", response)?;
        extract_first_image(&payload)
    }
}

/// First non-empty inline image in the first candidate, if any. Later
/// candidates are never consulted.
pub(crate) fn extract_first_image(payload: &Value) -> Result<Option<GeneratedImage>> {
    let parts = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for part in parts {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .context("Gemini image base64 decode failed")?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .map(str::to_string);
        return Ok(Some(GeneratedImage { bytes, mime_type }));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_text_parts_and_returns_first_image() -> Result<()> {
        let payload = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here is your portrait" },
                        { "inlineData": { "mimeType": "image/png", "data": "" } },
                        { "inlineData": { "mimeType": "image/png", "data": BASE64.encode([1u8, 2, 3]) } },
                        { "inlineData": { "mimeType": "image/png", "data": BASE64.encode([9u8]) } }
                    ]
                }
            }]
        });
        let image = extract_first_image(&payload)?;
        assert_eq!(
            image,
            Some(GeneratedImage {
                bytes: vec![1, 2, 3],
                mime_type: Some("image/png".to_string()),
            })
        );
        Ok(())
    }

    #[test]
    fn text_only_response_has_no_image() -> Result<()> {
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't do that" }] } }]
        });
        assert_eq!(extract_first_image(&payload)?, None);
        assert_eq!(extract_first_image(&json!({}))?, None);
        Ok(())
    }

    #[test]
    fn only_the_first_candidate_is_read() -> Result<()> {
        let payload = json!({
            "candidates": [
                { "content": { "parts": [{ "text": "no image here" }] } },
                { "content": { "parts": [{ "inlineData": { "data": BASE64.encode([5u8]) } }] } }
            ]
        });
        assert_eq!(extract_first_image(&payload)?, None);
        Ok(())
    }

    #[test]
    fn transport_errors_do_not_carry_the_key() {
        let config = EngineConfig {
            gemini_api_base: "http://127.0.0.1:1/v1beta".to_string(),
            request_timeout: Duration::from_secs(2),
            ..EngineConfig::default()
        };
        let image = [1u8];
        let request = ImageInvocation {
            credential: "SECRET-KEY-123",
            model: "gemini-2.0-flash-exp",
            prompt: "enhance",
            image: &image,
            mime_type: "image/jpeg",
        };
        let Err(err) = GeminiImageModel::new(&config).invoke(&request) else {
            panic!("closed port should refuse the request");
        };
        let text = crate::error_chain_text(&err, 2000);
        assert!(text.contains("Gemini request failed"), "{text}");
        assert!(!text.contains("SECRET-KEY-123"), "{text}");
        assert!(!format!("{err:?}").contains("SECRET-KEY-123"));
    }

    #[test]
    fn invalid_base64_is_an_error() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "inline_data": { "data": "@@@" } }] } }]
        });
        assert!(extract_first_image(&payload).is_err());
    }

    #[test]
    fn payload_puts_prompt_before_image() {
        let image = [7u8, 7];
        let request = ImageInvocation {
            credential: "k",
            model: "gemini-2.0-flash-exp",
            prompt: "enhance",
            image: &image,
            mime_type: "image/jpeg",
        };
        let payload = GeminiImageModel::build_payload(&request);
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "enhance");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
    }

    #[test]
    fn endpoint_accepts_prefixed_model_names() {
        let model = GeminiImageModel::new(&EngineConfig::default());
        assert_eq!(
            model.endpoint_for_model("models/gemini-1.5-pro"),
            model.endpoint_for_model("gemini-1.5-pro")
        );
        assert!(model
            .endpoint_for_model("gemini-1.5-pro")
            .ends_with("/models/gemini-1.5-pro:generateContent"));
    }
}
