//! OpenAI images adapter (also the wire shape for OpenAI-compatible hosts)

use super::{check_status, decode_b64, invalid_response, require_api_key, transport_error};
use crate::{contextual_prompt, GeneratedImage, GenerationParams, ProviderAdapter};
use async_trait::async_trait;
use mosaic_core::{ContextEntry, ModelConfig, ProviderError};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
pub(crate) struct ImagesRequest {
    pub model: String,
    pub prompt: String,
    pub n: u32,
    pub size: String,
    pub response_format: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImagesResponse {
    pub data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageDatum {
    pub b64_json: Option<String>,
}

/// POST an images/generations request and decode the first image.
///
/// Shared with [`GenericAdapter`], which speaks the same wire shape
/// against a custom base URL.
///
/// [`GenericAdapter`]: super::GenericAdapter
pub(crate) async fn images_generate(
    client: &Client,
    provider: &str,
    base_url: &str,
    api_key: &str,
    model: &str,
    prompt: &str,
    params: &GenerationParams,
) -> Result<GeneratedImage, ProviderError> {
    let request = ImagesRequest {
        model: model.to_string(),
        prompt: prompt.to_string(),
        n: 1,
        size: format!("{}x{}", params.width, params.height),
        response_format: "b64_json".to_string(),
    };

    let response = client
        .post(format!("{}/images/generations", base_url))
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;
    let response = check_status(provider, response).await?;

    let parsed: ImagesResponse = response
        .json()
        .await
        .map_err(|e| invalid_response(provider, format!("unparseable response: {}", e)))?;
    let datum = parsed
        .data
        .into_iter()
        .next()
        .ok_or_else(|| invalid_response(provider, "empty image data"))?;
    let b64 = datum
        .b64_json
        .ok_or_else(|| invalid_response(provider, "no b64_json payload"))?;

    Ok(GeneratedImage::png(decode_b64(provider, &b64)?))
}

/// Adapter for the OpenAI images API.
pub struct OpenAiAdapter {
    client: Client,
}

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn base_url<'a>(&self, config: &'a ModelConfig) -> &'a str {
        config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

impl Default for OpenAiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        config: &ModelConfig,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GeneratedImage, ProviderError> {
        let api_key = require_api_key(self.provider_name(), config)?;
        images_generate(
            &self.client,
            self.provider_name(),
            self.base_url(config),
            api_key,
            &config.id,
            prompt,
            params,
        )
        .await
    }

    // The images endpoint has no conversational state; prior iterations
    // are folded into the prompt instead.
    async fn edit(
        &self,
        config: &ModelConfig,
        _source_image: &[u8],
        prompt: &str,
        context: &[ContextEntry],
    ) -> Result<GeneratedImage, ProviderError> {
        let folded = contextual_prompt(prompt, context);
        self.generate(config, &folded, &GenerationParams::default())
            .await
    }
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = ImagesRequest {
            model: "gpt-image-1".into(),
            prompt: "a cat".into(),
            n: 1,
            size: "1024x1024".into(),
            response_format: "b64_json".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["size"], "1024x1024");
        assert_eq!(json["response_format"], "b64_json");
    }

    #[tokio::test]
    async fn test_generate_without_api_key() {
        let adapter = OpenAiAdapter::new();
        let config = ModelConfig {
            index: 1,
            provider: "openai".into(),
            id: "gpt-image-1".into(),
            api_key: None,
            base_url: None,
            user_id: None,
        };
        let err = adapter
            .generate(&config, "a cat", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredentials { .. }));
    }
}
