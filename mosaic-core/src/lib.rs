//! Mosaic Core - Entity Types
//!
//! Pure data structures shared by every other crate: session and counter
//! records, status enums, the error taxonomy, configuration, prompt
//! moderation, and caller-identity hashing. No I/O lives here.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod config;
pub mod counter;
pub mod error;
pub mod moderation;
pub mod session;
pub mod window;

pub use config::{ModelConfig, MosaicConfig, RateLimitConfig};
pub use counter::CounterRecord;
pub use error::{
    ConfigError, MosaicError, MosaicResult, ProviderError, SessionError, StoreError,
};
pub use moderation::PromptFilter;
pub use session::{
    IterationRecord, ModelSlot, SessionRecord, SessionStatus, UnitStatus, MAX_ITERATIONS,
};
pub use window::{ContextEntry, ContextWindowRecord, WINDOW_SIZE};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Session identifier using UUIDv7 for timestamp-sortable IDs.
pub type SessionId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new session identifier.
pub fn new_session_id() -> SessionId {
    Uuid::now_v7()
}

/// Schema version stamped into every persisted record kind.
///
/// Bumped when a record's wire shape changes; readers may use it to upcast
/// older documents.
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// CALLER IDENTITY HASHING
// ============================================================================

/// Hash a caller's network identity with a salt.
///
/// Rate-limit keys are derived from this hash rather than the raw address,
/// which bounds key cardinality and keeps PII out of storage key names.
pub fn hash_identity(identity: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(identity.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}
