//! Black Forest Labs (Flux) adapter
//!
//! BFL is asynchronous on the wire: a submit call returns a polling URL,
//! and the result is fetched once the task reports Ready. The executor's
//! per-unit timeout bounds the whole sequence; the internal attempt cap
//! only guards against a backend that never resolves a task.

use super::{check_status, encode_b64, invalid_response, require_api_key, transport_error};
use crate::{GeneratedImage, GenerationParams, OutpaintPreset, ProviderAdapter};
use async_trait::async_trait;
use mosaic_core::{ContextEntry, ModelConfig, ProviderError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.bfl.ai/v1";
const POLL_INTERVAL_MS: u64 = 500;
const MAX_POLL_ATTEMPTS: u32 = 240;

/// Pixels added per expanded edge for directional presets.
const EXPAND_MARGIN: u32 = 512;
/// Pixels added on every edge for the zoom-out preset.
const ZOOM_MARGIN: u32 = 256;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guidance: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    polling_url: String,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    status: String,
    result: Option<PollResult>,
}

#[derive(Debug, Deserialize)]
struct PollResult {
    sample: Option<String>,
}

/// Adapter for the BFL Flux family.
pub struct BflAdapter {
    client: Client,
}

impl BflAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn submit_and_poll(
        &self,
        config: &ModelConfig,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<GeneratedImage, ProviderError> {
        let provider = self.provider_name();
        let api_key = require_api_key(provider, config)?;
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

        let response = self
            .client
            .post(format!("{}/{}", base_url, endpoint))
            .header("x-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;
        let response = check_status(provider, response).await?;
        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(provider, format!("unparseable submit response: {}", e)))?;

        for _ in 0..MAX_POLL_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;

            let response = self
                .client
                .get(&submitted.polling_url)
                .header("x-key", api_key)
                .send()
                .await
                .map_err(|e| transport_error(provider, e))?;
            let response = check_status(provider, response).await?;
            let poll: PollResponse = response.json().await.map_err(|e| {
                invalid_response(provider, format!("unparseable poll response: {}", e))
            })?;

            match poll.status.as_str() {
                "Ready" => {
                    let sample = poll
                        .result
                        .and_then(|r| r.sample)
                        .ok_or_else(|| invalid_response(provider, "ready task without sample"))?;
                    return self.fetch_sample(&sample).await;
                }
                "Error" | "Failed" | "Content Moderated" | "Request Moderated" => {
                    return Err(ProviderError::RequestFailed {
                        provider: provider.to_string(),
                        status: 0,
                        message: format!("task ended in state {}", poll.status),
                    });
                }
                _ => continue,
            }
        }

        Err(ProviderError::Timeout {
            provider: provider.to_string(),
            timeout_secs: (MAX_POLL_ATTEMPTS as u64 * POLL_INTERVAL_MS) / 1000,
        })
    }

    async fn fetch_sample(&self, url: &str) -> Result<GeneratedImage, ProviderError> {
        let provider = self.provider_name();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;
        let response = check_status(provider, response).await?;

        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(provider, e))?;
        Ok(GeneratedImage {
            bytes: bytes.to_vec(),
            media_type,
        })
    }
}

impl Default for BflAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Edge margins for an outpaint preset: (top, bottom, left, right).
fn preset_margins(preset: OutpaintPreset) -> (u32, u32, u32, u32) {
    match preset {
        OutpaintPreset::Left => (0, 0, EXPAND_MARGIN, 0),
        OutpaintPreset::Right => (0, 0, 0, EXPAND_MARGIN),
        OutpaintPreset::Up => (EXPAND_MARGIN, 0, 0, 0),
        OutpaintPreset::Down => (0, EXPAND_MARGIN, 0, 0),
        OutpaintPreset::Zoom => (ZOOM_MARGIN, ZOOM_MARGIN, ZOOM_MARGIN, ZOOM_MARGIN),
    }
}

#[async_trait]
impl ProviderAdapter for BflAdapter {
    fn provider_name(&self) -> &str {
        "bfl"
    }

    async fn generate(
        &self,
        config: &ModelConfig,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GeneratedImage, ProviderError> {
        let request = GenerateRequest {
            prompt,
            width: params.width,
            height: params.height,
            steps: params.steps,
            guidance: params.guidance,
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| invalid_response(self.provider_name(), e.to_string()))?;
        self.submit_and_poll(config, &config.id, body).await
    }

    async fn edit(
        &self,
        config: &ModelConfig,
        source_image: &[u8],
        prompt: &str,
        _context: &[ContextEntry],
    ) -> Result<GeneratedImage, ProviderError> {
        let body = json!({
            "prompt": prompt,
            "input_image": encode_b64(source_image),
        });
        self.submit_and_poll(config, &config.id, body).await
    }

    async fn expand(
        &self,
        config: &ModelConfig,
        source_image: &[u8],
        preset: OutpaintPreset,
        prompt: &str,
    ) -> Result<GeneratedImage, ProviderError> {
        let (top, bottom, left, right) = preset_margins(preset);
        let body = json!({
            "image": encode_b64(source_image),
            "prompt": prompt,
            "top": top,
            "bottom": bottom,
            "left": left,
            "right": right,
        });
        self.submit_and_poll(config, "flux-pro-1.0-expand", body).await
    }
}

impl std::fmt::Debug for BflAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BflAdapter").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_margins() {
        assert_eq!(preset_margins(OutpaintPreset::Left), (0, 0, 512, 0));
        assert_eq!(preset_margins(OutpaintPreset::Down), (0, 512, 0, 0));
        assert_eq!(preset_margins(OutpaintPreset::Zoom), (256, 256, 256, 256));
    }

    #[test]
    fn test_poll_response_parses() {
        let raw = r#"{ "status": "Ready", "result": { "sample": "https://x/img" } }"#;
        let parsed: PollResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.status, "Ready");
        assert_eq!(parsed.result.unwrap().sample.unwrap(), "https://x/img");
    }

    #[test]
    fn test_generate_request_omits_unset_tuning() {
        let request = GenerateRequest {
            prompt: "a cat",
            width: 1024,
            height: 768,
            steps: None,
            guidance: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("steps").is_none());
        assert_eq!(json["height"], 768);
    }
}
