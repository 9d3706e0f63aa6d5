//! Error types for Mosaic operations
//!
//! Expected outcomes (a rate-limit rejection, a partially failed session)
//! are modeled as result enums where they occur, not as errors. The enums
//! here cover genuine failures: storage faults, provider faults, and
//! programming or data-integrity errors on update paths.

use thiserror::Error;
use uuid::Uuid;

/// Object-store and versioned-record errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("No object stored at key {key}")]
    NotFound { key: String },

    #[error("Conditional write rejected for key {key}")]
    Conflict { key: String },

    #[error("CAS retries exhausted for key {key} after {attempts} attempts")]
    RetryExhausted { key: String, attempts: u32 },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Store backend error: {reason}")]
    Backend { reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Provider adapter errors.
///
/// Adapters convert every transport and parse failure into one of these;
/// they never panic and never leak a raw reqwest error to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("{provider} call timed out after {timeout_secs}s")]
    Timeout { provider: String, timeout_secs: u64 },

    #[error("Operation {operation} not supported by {provider}")]
    Unsupported {
        provider: String,
        operation: String,
    },

    #[error("No API key configured for {provider}")]
    MissingCredentials { provider: String },
}

/// Session state-machine errors.
///
/// `SessionNotFound` / `ModelNotFound` on an update path indicate a
/// programming or data-integrity fault; update operations never create
/// missing records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: Uuid },

    #[error("Model {model} not found in session {session_id}")]
    ModelNotFound { session_id: Uuid, model: String },

    #[error("Model {model} is not enabled in session {session_id}")]
    ModelDisabled { session_id: Uuid, model: String },

    #[error("Iteration limit ({limit}) reached for model {model}")]
    IterationLimit { model: String, limit: usize },

    #[error("Iteration {index} not found for model {model}")]
    IterationNotFound { model: String, index: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Top-level error enum wrapping all error categories.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MosaicError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias used throughout the workspace.
pub type MosaicResult<T> = Result<T, MosaicError>;
