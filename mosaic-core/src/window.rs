//! Rolling context-window record
//!
//! A fixed-capacity FIFO of the most recent refinement iterations for one
//! `(session, model)` pair, stored at
//! `sessions/{session_id}/context/{model}.json`. The window is advisory
//! context for conversational refinement, not a correctness-critical log.

use crate::{SessionId, Timestamp, SCHEMA_VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Maximum entries retained per context window.
pub const WINDOW_SIZE: usize = 3;

/// A single entry in the context window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    /// Iteration index this entry came from (0 for the original render).
    pub iteration: usize,
    pub prompt: String,
    pub image_key: String,
    pub timestamp: Timestamp,
}

impl ContextEntry {
    /// Build an entry stamped with the current time.
    pub fn new(iteration: usize, prompt: impl Into<String>, image_key: impl Into<String>) -> Self {
        Self {
            iteration,
            prompt: prompt.into(),
            image_key: image_key.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Context-window document for one `(session, model)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextWindowRecord {
    pub schema_version: u32,
    pub session_id: SessionId,
    pub model: String,
    /// Entries ordered oldest to newest, at most [`WINDOW_SIZE`].
    pub window: Vec<ContextEntry>,
    /// Optimistic-locking version, incremented on every successful write.
    pub version: u64,
    pub updated_at: Timestamp,
}

impl ContextWindowRecord {
    /// An empty window, the implicit state of an absent key.
    pub fn empty(session_id: SessionId, model: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            session_id,
            model: model.into(),
            window: Vec::new(),
            version: 1,
            updated_at: Utc::now(),
        }
    }

    /// Append an entry, evicting from the front once the window is full.
    pub fn push(&mut self, entry: ContextEntry) {
        self.window.push(entry);
        while self.window.len() > WINDOW_SIZE {
            self.window.remove(0);
        }
    }
}
