//! Generic adapter for OpenAI-compatible image endpoints
//!
//! Several hosted backends (Recraft, Qwen, various proxies) expose the
//! OpenAI images wire shape at their own base URL; this adapter covers all
//! of them. A configured `base_url` is required.

use super::openai::images_generate;
use super::require_api_key;
use crate::{contextual_prompt, GeneratedImage, GenerationParams, ProviderAdapter};
use async_trait::async_trait;
use mosaic_core::{ContextEntry, ModelConfig, ProviderError};
use reqwest::Client;

/// Adapter for OpenAI-compatible endpoints at custom base URLs.
pub struct GenericAdapter {
    client: Client,
}

impl GenericAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn base_url<'a>(&self, config: &'a ModelConfig) -> Result<&'a str, ProviderError> {
        config
            .base_url
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: "generic".to_string(),
                reason: format!("model {} has no base_url configured", config.id),
            })
    }
}

impl Default for GenericAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for GenericAdapter {
    fn provider_name(&self) -> &str {
        "generic"
    }

    async fn generate(
        &self,
        config: &ModelConfig,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GeneratedImage, ProviderError> {
        let api_key = require_api_key(self.provider_name(), config)?;
        let base_url = self.base_url(config)?;
        images_generate(
            &self.client,
            self.provider_name(),
            base_url,
            api_key,
            &config.id,
            prompt,
            params,
        )
        .await
    }

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

impl std::fmt::Debug for GenericAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericAdapter").finish()
    }
}
