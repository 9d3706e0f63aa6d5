//! Session manager
//!
//! Every persisted session mutation goes through here as a single CAS
//! read-modify-write. Update operations never create records: a missing
//! session or unknown model on an update path is a `SessionError`, since
//! it indicates a caller bug or a corrupted record, not a race.
//!
//! Session documents use the last-writer-wins fallback when CAS retries
//! run out. Status is display state rebuilt from per-model outcomes; a
//! lost update there is recoverable, and an executor that cannot record
//! an outcome at all would strand the unit in `InProgress` forever.

use chrono::Utc;
use mosaic_core::{
    new_session_id, IterationRecord, SessionError, SessionId, SessionRecord, StoreError,
    UnitStatus, MAX_ITERATIONS,
};
use mosaic_store::{keys, ConflictPolicy, ObjectStore, VersionedStore};
use std::sync::Arc;

/// Coordinator for persisted session records.
#[derive(Clone)]
pub struct SessionManager {
    records: VersionedStore<SessionRecord>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            records: VersionedStore::with_policy(store, ConflictPolicy::LastWriterWins),
        }
    }

    /// Create a session with one slot per known model. Models named in
    /// `enabled` start `Pending`; the rest are `Disabled`.
    pub async fn create_session(
        &self,
        prompt: &str,
        models: &[&str],
        enabled: &[&str],
    ) -> Result<SessionId, SessionError> {
        let session_id = new_session_id();
        let record = SessionRecord::new(
            session_id,
            prompt,
            models.iter().copied(),
            enabled.iter().copied(),
        );
        self.records
            .create(&keys::session_status(session_id), &record)
            .await?;
        tracing::info!(%session_id, models = enabled.len(), "session created");
        Ok(session_id)
    }

    /// Fetch a session record, `None` when it does not exist.
    pub async fn session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self
            .records
            .load(&keys::session_status(session_id))
            .await?
            .map(|(record, _)| record))
    }

    /// Record that work on a model column has started.
    pub async fn mark_in_progress(
        &self,
        session_id: SessionId,
        model: &str,
    ) -> Result<SessionRecord, SessionError> {
        self.mutate_session(session_id, |record| {
            let slot = enabled_slot(session_id, record, model)?;
            slot.status = UnitStatus::InProgress;
            slot.started_at = Some(Utc::now());
            Ok(())
        })
        .await
    }

    /// Record a successful generation for a model column.
    pub async fn mark_complete(
        &self,
        session_id: SessionId,
        model: &str,
        image_key: &str,
        duration_secs: f64,
    ) -> Result<SessionRecord, SessionError> {
        self.mutate_session(session_id, |record| {
            let slot = enabled_slot(session_id, record, model)?;
            slot.status = UnitStatus::Completed;
            slot.completed_at = Some(Utc::now());
            slot.image_key = Some(image_key.to_string());
            slot.duration_secs = Some(duration_secs);
            slot.error = None;
            Ok(())
        })
        .await
    }

    /// Record a failed generation for a model column. `message` must
    /// already be sanitized; it is persisted verbatim.
    pub async fn mark_error(
        &self,
        session_id: SessionId,
        model: &str,
        message: &str,
    ) -> Result<SessionRecord, SessionError> {
        self.mutate_session(session_id, |record| {
            let slot = enabled_slot(session_id, record, model)?;
            slot.status = UnitStatus::Error;
            slot.completed_at = Some(Utc::now());
            slot.error = Some(message.to_string());
            Ok(())
        })
        .await
    }

    /// Open a refinement iteration on a model column and return its index.
    ///
    /// Rejects with [`SessionError::IterationLimit`] once the column holds
    /// [`MAX_ITERATIONS`] iterations.
    pub async fn begin_iteration(
        &self,
        session_id: SessionId,
        model: &str,
        prompt: &str,
    ) -> Result<usize, SessionError> {
        let mut index = 0;
        self.mutate_session(session_id, |record| {
            let slot = enabled_slot(session_id, record, model)?;
            if slot.iterations.len() >= MAX_ITERATIONS {
                return Err(SessionError::IterationLimit {
                    model: model.to_string(),
                    limit: MAX_ITERATIONS,
                });
            }
            index = slot.iterations.len();
            slot.iterations.push(IterationRecord {
                index,
                status: UnitStatus::InProgress,
                prompt: prompt.to_string(),
                started_at: Utc::now(),
                completed_at: None,
                image_key: None,
                error: None,
                duration_secs: None,
            });
            slot.iteration_count = slot.iterations.len();
            slot.status = UnitStatus::InProgress;
            Ok(())
        })
        .await?;
        Ok(index)
    }

    /// Close an iteration with its generated image.
    pub async fn complete_iteration(
        &self,
        session_id: SessionId,
        model: &str,
        index: usize,
        image_key: &str,
        duration_secs: f64,
    ) -> Result<SessionRecord, SessionError> {
        self.mutate_session(session_id, |record| {
            let slot = enabled_slot(session_id, record, model)?;
            let iteration = iteration_mut(slot, model, index)?;
            iteration.status = UnitStatus::Completed;
            iteration.completed_at = Some(Utc::now());
            iteration.image_key = Some(image_key.to_string());
            iteration.duration_secs = Some(duration_secs);
            slot.status = UnitStatus::Completed;
            Ok(())
        })
        .await
    }

    /// Close an iteration as failed. The column keeps its last completed
    /// image; a failed refinement does not discard earlier results.
    pub async fn fail_iteration(
        &self,
        session_id: SessionId,
        model: &str,
        index: usize,
        message: &str,
    ) -> Result<SessionRecord, SessionError> {
        self.mutate_session(session_id, |record| {
            let slot = enabled_slot(session_id, record, model)?;
            let iteration = iteration_mut(slot, model, index)?;
            iteration.status = UnitStatus::Error;
            iteration.completed_at = Some(Utc::now());
            iteration.error = Some(message.to_string());
            let recovered = slot
                .iterations
                .iter()
                .any(|it| it.status == UnitStatus::Completed)
                || slot.image_key.is_some();
            slot.status = if recovered {
                UnitStatus::Completed
            } else {
                UnitStatus::Error
            };
            Ok(())
        })
        .await
    }

    /// The newest completed image key for a model column, if any.
    pub async fn latest_image_key(
        &self,
        session_id: SessionId,
        model: &str,
    ) -> Result<Option<String>, SessionError> {
        let record = self
            .session(session_id)
            .await?
            .ok_or(SessionError::SessionNotFound { session_id })?;
        let slot = record
            .slot(model)
            .ok_or_else(|| SessionError::ModelNotFound {
                session_id,
                model: model.to_string(),
            })?;
        Ok(slot.latest_image_key().map(String::from))
    }

    /// One CAS mutation plus the invariant that overall status and the
    /// completed-count cache are recomputed on every write.
    async fn mutate_session<F>(
        &self,
        session_id: SessionId,
        mut f: F,
    ) -> Result<SessionRecord, SessionError>
    where
        F: FnMut(&mut SessionRecord) -> Result<(), SessionError> + Send,
    {
        let key = keys::session_status(session_id);
        let result = self
            .records
            .mutate(&key, |record: &mut SessionRecord| {
                f(record)?;
                record.recompute();
                Ok::<_, SessionError>(())
            })
            .await;
        match result {
            Err(SessionError::Store(StoreError::NotFound { .. })) => {
                Err(SessionError::SessionNotFound { session_id })
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish()
    }
}

/// Resolve a slot that must exist and be enabled.
fn enabled_slot<'a>(
    session_id: SessionId,
    record: &'a mut SessionRecord,
    model: &str,
) -> Result<&'a mut mosaic_core::ModelSlot, SessionError> {
    let slot = record
        .slot_mut(model)
        .ok_or_else(|| SessionError::ModelNotFound {
            session_id,
            model: model.to_string(),
        })?;
    if !slot.enabled {
        return Err(SessionError::ModelDisabled {
            session_id,
            model: model.to_string(),
        });
    }
    Ok(slot)
}

fn iteration_mut<'a>(
    slot: &'a mut mosaic_core::ModelSlot,
    model: &str,
    index: usize,
) -> Result<&'a mut IterationRecord, SessionError> {
    slot.iterations
        .iter_mut()
        .find(|it| it.index == index)
        .ok_or_else(|| SessionError::IterationNotFound {
            model: model.to_string(),
            index,
        })
}
