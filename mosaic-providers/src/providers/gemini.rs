//! Google Gemini adapter

use super::{check_status, decode_b64, encode_b64, invalid_response, require_api_key, transport_error};
use crate::{GeneratedImage, GenerationParams, ProviderAdapter};
use async_trait::async_trait;
use mosaic_core::{ContextEntry, ModelConfig, ProviderError};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

/// Adapter for Gemini image generation via `generateContent`.
pub struct GeminiAdapter {
    client: Client,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn generate_content(
        &self,
        config: &ModelConfig,
        parts: Vec<Part>,
    ) -> Result<GeneratedImage, ProviderError> {
        let provider = self.provider_name();
        let api_key = require_api_key(provider, config)?;
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

        let request = GenerateContentRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        };

        // API key goes in a header, never the URL, so transport errors
        // cannot echo it back.
        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", base_url, config.id))
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;
        let response = check_status(provider, response).await?;

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(provider, format!("unparseable response: {}", e)))?;

        let image = parsed
            .candidates
            .into_iter()
            .flat_map(|c| c.content.parts)
            .find_map(|part| part.inline_data)
            .ok_or_else(|| invalid_response(provider, "no inline image in candidates"))?;

        Ok(GeneratedImage {
            bytes: decode_b64(provider, &image.data)?,
            media_type: image.mime_type,
        })
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        config: &ModelConfig,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<GeneratedImage, ProviderError> {
        self.generate_content(
            config,
            vec![Part {
                text: Some(prompt.to_string()),
                inline_data: None,
            }],
        )
        .await
    }

    async fn edit(
        &self,
        config: &ModelConfig,
        source_image: &[u8],
        prompt: &str,
        _context: &[ContextEntry],
    ) -> Result<GeneratedImage, ProviderError> {
        // Native image-to-image: ship the source image alongside the
        // refinement instruction.
        self.generate_content(
            config,
            vec![
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: "image/png".to_string(),
                        data: encode_b64(source_image),
                    }),
                },
                Part {
                    text: Some(prompt.to_string()),
                    inline_data: None,
                },
            ],
        )
        .await
    }
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter").finish()
    }
}
