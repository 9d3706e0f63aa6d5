//! Rolling context-window log
//!
//! Bounded FIFO of recent refinement iterations per `(session, model)`
//! pair, maintained by CAS merge-append. Unlike the rate limiter this log
//! fails open: when retries run out the entry is written unconditionally
//! rather than lost, because dropping a concurrent merge only degrades
//! refinement context, never billing or admission correctness.

use crate::keys;
use crate::object::ObjectStore;
use crate::versioned::{ConflictPolicy, VersionedStore};
use mosaic_core::{ContextEntry, ContextWindowRecord, SessionId, StoreError};
use std::sync::Arc;

/// Store for per-model rolling context windows.
pub struct ContextLog {
    records: VersionedStore<ContextWindowRecord>,
    store: Arc<dyn ObjectStore>,
}

impl ContextLog {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            // Fail open on exhausted retries: the append must not be lost.
            records: VersionedStore::with_policy(
                Arc::clone(&store),
                ConflictPolicy::LastWriterWins,
            ),
            store,
        }
    }

    /// Append an entry, evicting the oldest once the window is full.
    pub async fn append(
        &self,
        session_id: SessionId,
        model: &str,
        entry: ContextEntry,
    ) -> Result<(), StoreError> {
        let key = keys::session_context(session_id, model);
        let model_name = model.to_string();
        self.records
            .upsert(
                &key,
                || ContextWindowRecord::empty(session_id, model_name.clone()),
                |record| {
                    record.push(entry.clone());
                    Ok::<_, StoreError>(())
                },
            )
            .await?;
        Ok(())
    }

    /// The current window, oldest to newest. Absent or malformed documents
    /// degrade to an empty window rather than erroring; stale context is
    /// recoverable, a failed refinement is not.
    pub async fn window(
        &self,
        session_id: SessionId,
        model: &str,
    ) -> Result<Vec<ContextEntry>, StoreError> {
        let key = keys::session_context(session_id, model);
        match self.records.load(&key).await {
            Ok(Some((record, _))) => Ok(record.window),
            Ok(None) => Ok(Vec::new()),
            Err(StoreError::Serialization { .. }) => {
                tracing::warn!(%session_id, model, "malformed context window, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the window for one model column.
    pub async fn clear(&self, session_id: SessionId, model: &str) -> Result<(), StoreError> {
        self.store
            .delete(&keys::session_context(session_id, model))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::MemoryObjectStore;
    use mosaic_core::{new_session_id, WINDOW_SIZE};

    fn log() -> ContextLog {
        ContextLog::new(Arc::new(MemoryObjectStore::new()))
    }

    #[tokio::test]
    async fn test_window_starts_empty() {
        let log = log();
        let window = log.window(new_session_id(), "flux").await.unwrap();
        assert!(window.is_empty());
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let log = log();
        let session = new_session_id();
        log.append(session, "flux", ContextEntry::new(0, "sunset", "k0"))
            .await
            .unwrap();

        let window = log.window(session, "flux").await.unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].image_key, "k0");
    }

    #[tokio::test]
    async fn test_window_keeps_newest_entries_in_order() {
        let log = log();
        let session = new_session_id();
        for i in 0..5 {
            log.append(
                session,
                "flux",
                ContextEntry::new(i, format!("p{}", i), format!("k{}", i)),
            )
            .await
            .unwrap();
        }

        let window = log.window(session, "flux").await.unwrap();
        assert_eq!(window.len(), WINDOW_SIZE);
        let iterations: Vec<_> = window.iter().map(|e| e.iteration).collect();
        assert_eq!(iterations, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_windows_are_isolated_per_model() {
        let log = log();
        let session = new_session_id();
        log.append(session, "flux", ContextEntry::new(0, "a", "k0"))
            .await
            .unwrap();

        assert!(log.window(session, "gemini").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_window() {
        let log = log();
        let session = new_session_id();
        log.append(session, "flux", ContextEntry::new(0, "a", "k0"))
            .await
            .unwrap();
        log.clear(session, "flux").await.unwrap();
        assert!(log.window(session, "flux").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_document_degrades_to_empty() {
        let store = Arc::new(MemoryObjectStore::new());
        let session = new_session_id();
        store
            .put(
                &keys::session_context(session, "flux"),
                b"not json".to_vec(),
            )
            .await
            .unwrap();

        let log = ContextLog::new(store);
        assert!(log.window(session, "flux").await.unwrap().is_empty());
    }
}
