//! Provider detection from model names
//!
//! Deployment config may name a provider explicitly; when it does not, the
//! model name itself is usually distinctive enough to route on.

use std::fmt;

/// Supported backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Bfl,
    /// OpenAI-compatible endpoint at a custom base URL.
    Generic,
}

impl ProviderKind {
    /// Resolve an explicitly configured provider string.
    pub fn from_name(name: &str) -> ProviderKind {
        match name.to_lowercase().as_str() {
            "openai" => ProviderKind::OpenAi,
            "gemini" | "google_gemini" | "google" => ProviderKind::Gemini,
            "bfl" | "flux" | "black_forest" => ProviderKind::Bfl,
            _ => ProviderKind::Generic,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Bfl => "bfl",
            ProviderKind::Generic => "generic",
        };
        write!(f, "{}", s)
    }
}

/// Detect the provider family from a bare model name.
pub fn detect_provider(model_name: &str) -> ProviderKind {
    let name = model_name.to_lowercase();

    if ["dalle", "dall-e", "gpt", "chatgpt"].iter().any(|kw| name.contains(kw)) {
        return ProviderKind::OpenAi;
    }
    if name.contains("gemini") || name.contains("imagen") {
        return ProviderKind::Gemini;
    }
    if ["flux", "black forest", "bfl"].iter().any(|kw| name.contains(kw)) {
        return ProviderKind::Bfl;
    }

    tracing::debug!(model_name, "unknown provider, using generic adapter");
    ProviderKind::Generic
}
