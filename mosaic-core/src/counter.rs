//! Per-timeslice counter record
//!
//! One JSON document per `(dimension, timeslice)` pair, e.g.
//! `rate-limit/global/2026-08-25T14.json`. A timeslice key becomes garbage
//! the moment its window rolls over; stale keys stay in storage.

use crate::{Timestamp, SCHEMA_VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Counter document used by the rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRecord {
    pub schema_version: u32,
    /// Non-negative request count within this timeslice.
    pub count: u64,
    /// Optimistic-locking version, incremented on every successful write.
    pub version: u64,
    pub updated_at: Timestamp,
}

impl CounterRecord {
    /// A zero counter, the implicit state of an absent key.
    pub fn zero() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            count: 0,
            version: 1,
            updated_at: Utc::now(),
        }
    }
}

impl Default for CounterRecord {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_counter() {
        let counter = CounterRecord::zero();
        assert_eq!(counter.count, 0);
        assert_eq!(counter.version, 1);
    }

    #[test]
    fn test_counter_round_trip() {
        let counter = CounterRecord::zero();
        let json = serde_json::to_string(&counter).unwrap();
        let back: CounterRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, counter);
    }
}
