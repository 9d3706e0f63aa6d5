//! Concrete provider implementations
//!
//! One module per backend family. All adapters share the same error
//! mapping: transport failures become `RequestFailed` with status 0, HTTP
//! 429 becomes `RateLimited`, other non-2xx statuses carry the (truncated)
//! response body, and unparseable payloads become `InvalidResponse`.

pub mod bfl;
pub mod gemini;
pub mod generic;
pub mod openai;

pub use bfl::BflAdapter;
pub use gemini::GeminiAdapter;
pub use generic::GenericAdapter;
pub use openai::OpenAiAdapter;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use mosaic_core::{ModelConfig, ProviderError};
use reqwest::Response;

/// Cap persisted upstream error bodies; some providers echo whole requests.
const MAX_ERROR_BODY: usize = 300;

pub(crate) fn transport_error(provider: &str, error: reqwest::Error) -> ProviderError {
    ProviderError::RequestFailed {
        provider: provider.to_string(),
        status: 0,
        message: error.to_string(),
    }
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> ProviderError {
    ProviderError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

/// Resolve the API key for a call or fail with a typed error.
pub(crate) fn require_api_key<'a>(
    provider: &str,
    config: &'a ModelConfig,
) -> Result<&'a str, ProviderError> {
    config
        .api_key
        .as_deref()
        .ok_or_else(|| ProviderError::MissingCredentials {
            provider: provider.to_string(),
        })
}

/// Turn a non-success response into the matching typed error.
pub(crate) async fn check_status(
    provider: &str,
    response: Response,
) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_ms = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .map(|secs| (secs * 1000.0) as i64)
            .unwrap_or(0);
        return Err(ProviderError::RateLimited {
            provider: provider.to_string(),
            retry_after_ms,
        });
    }

    let mut body = response
        .text()
        .await
        .unwrap_or_else(|_| "unreadable error body".to_string());
    body.truncate(MAX_ERROR_BODY);
    Err(ProviderError::RequestFailed {
        provider: provider.to_string(),
        status: status.as_u16(),
        message: body,
    })
}

pub(crate) fn decode_b64(provider: &str, data: &str) -> Result<Vec<u8>, ProviderError> {
    BASE64
        .decode(data)
        .map_err(|e| invalid_response(provider, format!("bad base64 image payload: {}", e)))
}

pub(crate) fn encode_b64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}
