//! Mosaic Providers - Image Backend Adapters
//!
//! Provider-agnostic trait for image generation backends plus the concrete
//! HTTP implementations. The executor treats every adapter identically;
//! adapters convert all transport and parse failures into
//! [`ProviderError`] and never panic.

use async_trait::async_trait;
use mosaic_core::{ContextEntry, ModelConfig, ProviderError};
use serde::{Deserialize, Serialize};

pub mod detect;
pub mod providers;
pub mod registry;
pub mod sanitize;

pub use detect::{detect_provider, ProviderKind};
pub use providers::{BflAdapter, GeminiAdapter, GenericAdapter, OpenAiAdapter};
pub use registry::ModelRegistry;
pub use sanitize::redact_secrets;

// ============================================================================
// ADAPTER CONTRACT
// ============================================================================

/// Tuning parameters passed through to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub width: u32,
    pub height: u32,
    pub steps: Option<u32>,
    pub guidance: Option<f32>,
    pub negative_prompt: Option<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            steps: None,
            guidance: None,
            negative_prompt: None,
        }
    }
}

/// A successfully generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl GeneratedImage {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            media_type: "image/png".to_string(),
        }
    }
}

/// Canvas-expansion direction presets for outpainting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutpaintPreset {
    Left,
    Right,
    Up,
    Down,
    Zoom,
}

/// Trait implemented by every image backend.
///
/// Implementations must be thread-safe and must return the error shape for
/// every failure mode - an adapter that panics or leaks a transport error
/// would break the executor's per-unit isolation.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider identifier used in logs and error messages.
    fn provider_name(&self) -> &str;

    /// Generate an image from a text prompt.
    async fn generate(
        &self,
        config: &ModelConfig,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GeneratedImage, ProviderError>;

    /// Refine a previously generated image. `context` holds the rolling
    /// window of prior iterations, oldest to newest; adapters without true
    /// image-to-image support may fold it into the prompt instead.
    async fn edit(
        &self,
        config: &ModelConfig,
        source_image: &[u8],
        prompt: &str,
        context: &[ContextEntry],
    ) -> Result<GeneratedImage, ProviderError> {
        let _ = (config, source_image, prompt, context);
        Err(ProviderError::Unsupported {
            provider: self.provider_name().to_string(),
            operation: "edit".to_string(),
        })
    }

    /// Expand the canvas of an existing image (outpainting).
    async fn expand(
        &self,
        config: &ModelConfig,
        source_image: &[u8],
        preset: OutpaintPreset,
        prompt: &str,
    ) -> Result<GeneratedImage, ProviderError> {
        let _ = (config, source_image, preset, prompt);
        Err(ProviderError::Unsupported {
            provider: self.provider_name().to_string(),
            operation: "expand".to_string(),
        })
    }
}

/// Fold a context window into a refinement prompt for adapters without
/// native image-to-image support.
pub(crate) fn contextual_prompt(prompt: &str, context: &[ContextEntry]) -> String {
    if context.is_empty() {
        return prompt.to_string();
    }
    let mut lines = vec!["Refine the image described by this history:".to_string()];
    for entry in context {
        lines.push(format!("- iteration {}: {}", entry.iteration, entry.prompt));
    }
    lines.push(format!("Now: {}", prompt));
    lines.join("\n")
}
