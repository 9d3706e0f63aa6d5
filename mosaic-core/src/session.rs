//! Session record and status state machine
//!
//! A session is one prompt fanned out across several model columns. The
//! record is a single JSON document in the object store; the overall status
//! is never written directly - it is always re-derived from the per-model
//! statuses after each mutation.

use crate::{SessionId, Timestamp, SCHEMA_VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum refinement iterations per model column.
pub const MAX_ITERATIONS: usize = 7;

// ============================================================================
// STATUS ENUMS
// ============================================================================

/// Status of a single unit of work (one model column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    InProgress,
    Completed,
    Error,
    Disabled,
}

impl UnitStatus {
    /// Whether the unit has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitStatus::Completed | UnitStatus::Error)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitStatus::Pending => "pending",
            UnitStatus::InProgress => "in_progress",
            UnitStatus::Completed => "completed",
            UnitStatus::Error => "error",
            UnitStatus::Disabled => "disabled",
        };
        write!(f, "{}", s)
    }
}

/// Overall session status, derived from the multiset of unit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Partial,
    Failed,
}

impl SessionStatus {
    /// Derive the overall status from per-unit statuses.
    ///
    /// Disabled units do not participate. The rules, in order:
    /// - no active units, or all still pending => Pending
    /// - every active unit terminal: no errors => Completed,
    ///   no completions => Failed, otherwise => Partial
    /// - anything else (work started, not all terminal) => InProgress
    pub fn derive<I>(units: I) -> SessionStatus
    where
        I: IntoIterator<Item = UnitStatus>,
    {
        let mut pending = 0usize;
        let mut in_progress = 0usize;
        let mut completed = 0usize;
        let mut errored = 0usize;

        for unit in units {
            match unit {
                UnitStatus::Pending => pending += 1,
                UnitStatus::InProgress => in_progress += 1,
                UnitStatus::Completed => completed += 1,
                UnitStatus::Error => errored += 1,
                UnitStatus::Disabled => {}
            }
        }

        let active = pending + in_progress + completed + errored;
        if active == 0 || pending == active {
            return SessionStatus::Pending;
        }

        if pending == 0 && in_progress == 0 {
            return if errored == 0 {
                SessionStatus::Completed
            } else if completed == 0 {
                SessionStatus::Failed
            } else {
                SessionStatus::Partial
            };
        }

        SessionStatus::InProgress
    }
}

// ============================================================================
// RECORD TYPES
// ============================================================================

/// One refinement iteration within a model column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub index: usize,
    pub status: UnitStatus,
    pub prompt: String,
    pub started_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Per-model state within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSlot {
    pub enabled: bool,
    pub status: UnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub iteration_count: usize,
    #[serde(default)]
    pub iterations: Vec<IterationRecord>,
}

impl ModelSlot {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            status: if enabled {
                UnitStatus::Pending
            } else {
                UnitStatus::Disabled
            },
            started_at: None,
            completed_at: None,
            image_key: None,
            error: None,
            duration_secs: None,
            iteration_count: 0,
            iterations: Vec::new(),
        }
    }

    /// The most recent completed image key, considering iterations first.
    pub fn latest_image_key(&self) -> Option<&str> {
        self.iterations
            .iter()
            .rev()
            .find(|it| it.status == UnitStatus::Completed)
            .and_then(|it| it.image_key.as_deref())
            .or(self.image_key.as_deref())
    }
}

/// Session document stored at `sessions/{session_id}/status.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub schema_version: u32,
    pub session_id: SessionId,
    pub status: SessionStatus,
    /// Optimistic-locking version, incremented on every successful write.
    pub version: u64,
    pub prompt: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub total_models: usize,
    /// Cached count of completed units; recomputed on every mutation.
    pub completed_models: usize,
    pub models: BTreeMap<String, ModelSlot>,
}

impl SessionRecord {
    /// Build a fresh session record with every known model either pending
    /// (enabled) or disabled.
    pub fn new<'a, M, E>(session_id: SessionId, prompt: impl Into<String>, models: M, enabled: E) -> Self
    where
        M: IntoIterator<Item = &'a str>,
        E: IntoIterator<Item = &'a str>,
    {
        let enabled: Vec<&str> = enabled.into_iter().collect();
        let models: BTreeMap<String, ModelSlot> = models
            .into_iter()
            .map(|name| (name.to_string(), ModelSlot::new(enabled.contains(&name))))
            .collect();

        let now = Utc::now();
        let total_models = models.values().filter(|m| m.enabled).count();
        Self {
            schema_version: SCHEMA_VERSION,
            session_id,
            status: SessionStatus::Pending,
            version: 1,
            prompt: prompt.into(),
            created_at: now,
            updated_at: now,
            total_models,
            completed_models: 0,
            models,
        }
    }

    /// Re-derive the overall status and the completed-count cache from the
    /// model map. Called after every mutation so the cached values never
    /// outlive a single write.
    pub fn recompute(&mut self) {
        self.status = SessionStatus::derive(self.models.values().map(|m| m.status));
        self.completed_models = self
            .models
            .values()
            .filter(|m| m.status == UnitStatus::Completed)
            .count();
    }

    /// Look up a model slot by name.
    pub fn slot(&self, model: &str) -> Option<&ModelSlot> {
        self.models.get(model)
    }

    /// Mutable model slot lookup.
    pub fn slot_mut(&mut self, model: &str) -> Option<&mut ModelSlot> {
        self.models.get_mut(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use UnitStatus::*;

    fn derive(units: &[UnitStatus]) -> SessionStatus {
        SessionStatus::derive(units.iter().copied())
    }

    #[test]
    fn test_derive_all_pending() {
        assert_eq!(derive(&[Pending, Pending]), SessionStatus::Pending);
    }

    #[test]
    fn test_derive_any_in_progress() {
        assert_eq!(derive(&[Pending, InProgress]), SessionStatus::InProgress);
        assert_eq!(derive(&[InProgress, Completed]), SessionStatus::InProgress);
    }

    #[test]
    fn test_derive_pending_and_terminal_mix_still_in_progress() {
        assert_eq!(derive(&[Pending, Completed]), SessionStatus::InProgress);
        assert_eq!(derive(&[Pending, Error]), SessionStatus::InProgress);
    }

    #[test]
    fn test_derive_terminal_combinations() {
        assert_eq!(derive(&[Completed, Completed]), SessionStatus::Completed);
        assert_eq!(derive(&[Completed, Error]), SessionStatus::Partial);
        assert_eq!(derive(&[Error, Error]), SessionStatus::Failed);
    }

    #[test]
    fn test_derive_ignores_disabled() {
        assert_eq!(derive(&[Disabled, Completed]), SessionStatus::Completed);
        assert_eq!(derive(&[Disabled, Error]), SessionStatus::Failed);
        assert_eq!(derive(&[Disabled, Disabled]), SessionStatus::Pending);
        assert_eq!(derive(&[]), SessionStatus::Pending);
    }

    #[test]
    fn test_new_session_marks_disabled_models() {
        let record = SessionRecord::new(
            crate::new_session_id(),
            "sunset",
            ["flux", "gemini", "recraft"],
            ["flux"],
        );
        assert_eq!(record.status, SessionStatus::Pending);
        assert_eq!(record.version, 1);
        assert_eq!(record.total_models, 1);
        assert_eq!(record.slot("flux").unwrap().status, Pending);
        assert!(record.slot("flux").unwrap().enabled);
        assert_eq!(record.slot("recraft").unwrap().status, Disabled);
        assert!(!record.slot("recraft").unwrap().enabled);
    }

    #[test]
    fn test_recompute_updates_completed_cache() {
        let mut record =
            SessionRecord::new(crate::new_session_id(), "p", ["a", "b"], ["a", "b"]);
        record.slot_mut("a").unwrap().status = Completed;
        record.slot_mut("b").unwrap().status = Error;
        record.recompute();
        assert_eq!(record.status, SessionStatus::Partial);
        assert_eq!(record.completed_models, 1);
    }

    #[test]
    fn test_latest_image_key_prefers_iterations() {
        let mut slot = ModelSlot::new(true);
        slot.image_key = Some("base".into());
        assert_eq!(slot.latest_image_key(), Some("base"));

        slot.iterations.push(IterationRecord {
            index: 0,
            status: Completed,
            prompt: "refine".into(),
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            image_key: Some("iter-0".into()),
            error: None,
            duration_secs: Some(1.0),
        });
        slot.iterations.push(IterationRecord {
            index: 1,
            status: InProgress,
            prompt: "more".into(),
            started_at: Utc::now(),
            completed_at: None,
            image_key: None,
            error: None,
            duration_secs: None,
        });
        assert_eq!(slot.latest_image_key(), Some("iter-0"));
    }

    #[test]
    fn test_session_record_round_trips_camel_case() {
        let record = SessionRecord::new(crate::new_session_id(), "p", ["a"], ["a"]);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("sessionId").is_some());
        assert!(json.get("completedModels").is_some());
        let back: SessionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    fn unit_status_strategy() -> impl Strategy<Value = UnitStatus> {
        prop_oneof![
            Just(Pending),
            Just(InProgress),
            Just(Completed),
            Just(Error),
            Just(Disabled),
        ]
    }

    proptest! {
        /// The derivation table, stated as invariants over arbitrary
        /// multisets of unit statuses.
        #[test]
        fn prop_derive_matches_table(units in prop::collection::vec(unit_status_strategy(), 0..12)) {
            let overall = derive(&units);
            let active: Vec<_> = units.iter().filter(|u| **u != Disabled).collect();
            let any_started = active.iter().any(|u| **u != Pending);
            let all_terminal = !active.is_empty() && active.iter().all(|u| u.is_terminal());
            let any_error = active.iter().any(|u| **u == Error);
            let any_completed = active.iter().any(|u| **u == Completed);

            match overall {
                SessionStatus::Pending => prop_assert!(!any_started),
                SessionStatus::InProgress => prop_assert!(any_started && !all_terminal),
                SessionStatus::Completed => prop_assert!(all_terminal && !any_error),
                SessionStatus::Failed => prop_assert!(all_terminal && !any_completed),
                SessionStatus::Partial => {
                    prop_assert!(all_terminal && any_error && any_completed)
                }
            }
        }
    }
}
