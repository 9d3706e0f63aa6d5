//! API error mapping
//!
//! Typed errors with a stable machine-readable code, serialized as JSON.
//! Domain errors from the lower crates map onto these at the handler
//! boundary; storage faults never leak backend detail to callers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mosaic_core::{SessionError, StoreError};
use mosaic_store::LimitScope;
use serde::Serialize;

/// Result alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Prompt rejected by the moderation gate.
    BlockedPrompt,
    /// Caller or deployment is over quota.
    RateLimited(LimitScope),
    /// Malformed or out-of-range request.
    InvalidRequest(String),
    /// Session, model, or context document does not exist.
    NotFound(String),
    /// Refinement limit reached for the model column.
    IterationLimit { model: String, limit: usize },
    /// Storage or other backend fault. Detail goes to the log, not the
    /// response body.
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BlockedPrompt | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::IterationLimit { .. } => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BlockedPrompt => "blocked_prompt",
            ApiError::RateLimited(_) => "rate_limited",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::IterationLimit { .. } => "iteration_limit",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BlockedPrompt => {
                "Prompt contains content that cannot be generated".to_string()
            }
            ApiError::RateLimited(LimitScope::Identity) => {
                "Daily request limit reached for this client".to_string()
            }
            ApiError::RateLimited(LimitScope::Global) => {
                "Service is at capacity, try again later".to_string()
            }
            ApiError::InvalidRequest(message) => message.clone(),
            ApiError::NotFound(what) => format!("{} not found", what),
            ApiError::IterationLimit { model, limit } => {
                format!("Model {} has reached the {}-iteration limit", model, limit)
            }
            ApiError::Internal(_) => "Internal error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(detail, "request failed");
        }
        let body = ErrorBody {
            error: self.code(),
            message: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::SessionNotFound { .. } => ApiError::NotFound("session".to_string()),
            SessionError::ModelNotFound { model, .. } => {
                ApiError::NotFound(format!("model {}", model))
            }
            SessionError::ModelDisabled { model, .. } => {
                ApiError::InvalidRequest(format!("model {} is not enabled", model))
            }
            SessionError::IterationLimit { model, limit } => {
                ApiError::IterationLimit { model, limit }
            }
            SessionError::IterationNotFound { model, index } => {
                ApiError::NotFound(format!("iteration {} of model {}", index, model))
            }
            SessionError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
