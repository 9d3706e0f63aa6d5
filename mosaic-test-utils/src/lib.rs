//! Mosaic Test Utils - Scripted Adapters and Fixtures
//!
//! Deterministic stand-ins for the HTTP provider adapters. Tests script a
//! behavior per model id and assert on the calls the adapter received;
//! nothing here touches the network.

use async_trait::async_trait;
use mosaic_core::{ContextEntry, ModelConfig, ProviderError};
use mosaic_providers::{GeneratedImage, GenerationParams, ProviderAdapter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Scripted behavior for one model id.
#[derive(Debug, Clone)]
pub enum Script {
    /// Return these bytes as a PNG.
    Image(Vec<u8>),
    /// Fail with a 500-shaped provider error carrying this message.
    Fail(String),
    /// Never resolve. Exercises the executor's per-unit timeout.
    Hang,
}

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
    pub operation: &'static str,
}

/// A [`ProviderAdapter`] whose behavior is scripted per model id.
///
/// Models without a script return a one-byte PNG, so the happy path needs
/// no setup.
pub struct ScriptedAdapter {
    name: String,
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedAdapter {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Script the behavior for one model id.
    pub fn script(&self, model: impl Into<String>, script: Script) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(model.into(), script);
        }
    }

    /// Every call the adapter has received, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    async fn run(
        &self,
        config: &ModelConfig,
        prompt: &str,
        operation: &'static str,
    ) -> Result<GeneratedImage, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                model: config.id.clone(),
                prompt: prompt.to_string(),
                operation,
            });
        }

        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|scripts| scripts.get(&config.id).cloned());
        match script {
            None => Ok(GeneratedImage::png(vec![0u8])),
            Some(Script::Image(bytes)) => Ok(GeneratedImage::png(bytes)),
            Some(Script::Fail(message)) => Err(ProviderError::RequestFailed {
                provider: self.name.clone(),
                status: 500,
                message,
            }),
            Some(Script::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        config: &ModelConfig,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<GeneratedImage, ProviderError> {
        self.run(config, prompt, "generate").await
    }

    async fn edit(
        &self,
        config: &ModelConfig,
        _source_image: &[u8],
        prompt: &str,
        _context: &[ContextEntry],
    ) -> Result<GeneratedImage, ProviderError> {
        self.run(config, prompt, "edit").await
    }
}

impl std::fmt::Debug for ScriptedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedAdapter")
            .field("name", &self.name)
            .finish()
    }
}

/// A model config pointing at nothing; adapters in tests never dial out.
pub fn model_config(index: usize, provider: &str, id: &str) -> ModelConfig {
    ModelConfig {
        index,
        provider: provider.to_string(),
        id: id.to_string(),
        api_key: Some("test-key".to_string()),
        base_url: None,
        user_id: None,
    }
}
