//! Storage key layout
//!
//! Every persisted document lives under one of these key families:
//!
//! ```text
//! sessions/{session_id}/status.json
//! sessions/{session_id}/context/{model}.json
//! rate-limit/global/{YYYY-MM-DDTHH}.json
//! rate-limit/identity/{hash}/{YYYY-MM-DD}.json
//! images/{target}/{model}-{uuid}.{ext}
//! ```

use chrono::{DateTime, Utc};
use mosaic_core::SessionId;

/// Key of a session's status document.
pub fn session_status(session_id: SessionId) -> String {
    format!("sessions/{}/status.json", session_id)
}

/// Key of a context-window document for one model column.
pub fn session_context(session_id: SessionId, model: &str) -> String {
    format!("sessions/{}/context/{}.json", session_id, sanitize(model))
}

/// Key of the global hourly rate-limit counter.
pub fn global_counter(now: DateTime<Utc>) -> String {
    format!("rate-limit/global/{}.json", now.format("%Y-%m-%dT%H"))
}

/// Key of a per-identity daily rate-limit counter. `identity_hash` is a
/// salted hash, never a raw network identity.
pub fn identity_counter(identity_hash: &str, now: DateTime<Utc>) -> String {
    format!(
        "rate-limit/identity/{}/{}.json",
        identity_hash,
        now.format("%Y-%m-%d")
    )
}

/// Replace characters that are awkward in object keys.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_counter_keys_roll_with_timeslice() {
        let t1 = Utc.with_ymd_and_hms(2026, 8, 25, 14, 5, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 8, 25, 15, 0, 0).unwrap();
        assert_eq!(global_counter(t1), "rate-limit/global/2026-08-25T14.json");
        assert_ne!(global_counter(t1), global_counter(t2));

        // Same day, different hour: identity key stays put.
        assert_eq!(identity_counter("abcd", t1), identity_counter("abcd", t2));
    }

    #[test]
    fn test_sanitize_model_names() {
        assert_eq!(sanitize("flux-pro 1.1"), "flux-pro_1_1");
        assert_eq!(sanitize("gpt_image"), "gpt_image");
    }
}
