//! Atomic per-timeslice counters and the rate limiter built on them
//!
//! Counters are plain versioned records keyed by `(dimension, timeslice)`;
//! a new timeslice rolls to a new key, which resets the count without any
//! cleanup pass. Increments are CAS read-modify-writes and the limiter
//! fails closed: a request whose increment could not be durably recorded
//! is rejected, because under-counting defeats the limiter.

use crate::keys;
use crate::object::ObjectStore;
use crate::versioned::{backoff, VersionedRecord, VersionedStore, MAX_CAS_RETRIES};
use chrono::Utc;
use mosaic_core::{hash_identity, CounterRecord, RateLimitConfig, StoreError};
use std::sync::Arc;

/// Outcome of a single counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Increment {
    /// The increment was recorded; carries the new count.
    Admitted(u64),
    /// The counter is at its limit, or the increment could not be
    /// durably recorded.
    LimitExceeded,
}

/// Which limit rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Identity,
    Global,
}

/// Admission decision for one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Limited(LimitScope),
}

impl Admission {
    pub fn is_limited(&self) -> bool {
        matches!(self, Admission::Limited(_))
    }
}

// ============================================================================
// SLICE COUNTER
// ============================================================================

/// CAS-backed counter over arbitrary keys.
pub struct SliceCounter {
    records: VersionedStore<CounterRecord>,
}

impl SliceCounter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            records: VersionedStore::new(store),
        }
    }

    /// Attempt to record one request against `key`.
    ///
    /// Reads the current count (absent key counts as zero), rejects at the
    /// limit without writing, otherwise commits `count + 1` with
    /// create-if-absent CAS. Conflicts re-read and retry; exhausted
    /// retries fail closed.
    pub async fn try_increment(&self, key: &str, limit: u64) -> Result<Increment, StoreError> {
        for attempt in 1..=MAX_CAS_RETRIES {
            let (mut record, tag) = match self.records.load(key).await? {
                Some((record, tag)) => (record, Some(tag)),
                None => (CounterRecord::zero(), None),
            };

            if record.count >= limit {
                return Ok(Increment::LimitExceeded);
            }

            record.count += 1;
            if tag.is_some() {
                let next = record.version() + 1;
                record.set_version(next);
            }
            record.touch();

            match self.records.write_if(key, &record, tag.as_ref()).await {
                Ok(_) => return Ok(Increment::Admitted(record.count)),
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(key, attempt, "counter CAS conflict, retrying");
                    backoff().await;
                }
                Err(e) => return Err(e),
            }
        }

        // Fail closed: an unrecordable increment is a rejection.
        tracing::warn!(key, "counter CAS retries exhausted, failing closed");
        Ok(Increment::LimitExceeded)
    }

    /// Current count for a key, zero when absent.
    pub async fn current(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self
            .records
            .load(key)
            .await?
            .map(|(record, _)| record.count)
            .unwrap_or(0))
    }
}

// ============================================================================
// RATE LIMITER
// ============================================================================

/// Two-scope rate limiter: per-identity per day, global per hour.
///
/// The narrower identity scope is checked first so an over-quota identity
/// never inflates the shared global counter. Whitelisted identities bypass
/// the limiter without touching storage.
pub struct RateLimiter {
    counter: SliceCounter,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn ObjectStore>, config: RateLimitConfig) -> Self {
        Self {
            counter: SliceCounter::new(store),
            config,
        }
    }

    /// Admission check for one request from `identity`.
    pub async fn check(&self, identity: &str) -> Result<Admission, StoreError> {
        if self.config.whitelist.iter().any(|ip| ip == identity) {
            tracing::debug!(identity, "whitelisted, bypassing rate limit");
            return Ok(Admission::Allowed);
        }

        let now = Utc::now();
        let identity_hash = hash_identity(identity, &self.config.identity_salt);
        let identity_key = keys::identity_counter(&identity_hash, now);
        match self
            .counter
            .try_increment(&identity_key, self.config.identity_limit)
            .await?
        {
            Increment::LimitExceeded => {
                tracing::info!(identity_hash, "identity rate limit exceeded");
                return Ok(Admission::Limited(LimitScope::Identity));
            }
            Increment::Admitted(count) => {
                tracing::debug!(identity_hash, count, "identity counter incremented");
            }
        }

        let global_key = keys::global_counter(now);
        match self
            .counter
            .try_increment(&global_key, self.config.global_limit)
            .await?
        {
            Increment::LimitExceeded => {
                tracing::info!("global rate limit exceeded");
                Ok(Admission::Limited(LimitScope::Global))
            }
            Increment::Admitted(_) => Ok(Admission::Allowed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::MemoryObjectStore;

    fn limiter(global: u64, identity: u64, whitelist: Vec<String>) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryObjectStore::new()),
            RateLimitConfig {
                global_limit: global,
                identity_limit: identity,
                whitelist,
                identity_salt: "test-salt".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_sequential_increments_hit_the_limit() {
        let counter = SliceCounter::new(Arc::new(MemoryObjectStore::new()));

        assert_eq!(
            counter.try_increment("c", 2).await.unwrap(),
            Increment::Admitted(1)
        );
        assert_eq!(
            counter.try_increment("c", 2).await.unwrap(),
            Increment::Admitted(2)
        );
        assert_eq!(
            counter.try_increment("c", 2).await.unwrap(),
            Increment::LimitExceeded
        );
    }

    #[tokio::test]
    async fn test_rejection_does_not_write() {
        let counter = SliceCounter::new(Arc::new(MemoryObjectStore::new()));
        counter.try_increment("c", 1).await.unwrap();
        counter.try_increment("c", 1).await.unwrap();
        counter.try_increment("c", 1).await.unwrap();
        assert_eq!(counter.current("c").await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_never_exceed_limit() {
        let counter = Arc::new(SliceCounter::new(Arc::new(MemoryObjectStore::new())));
        let limit = 4u64;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                counter.try_increment("c", limit).await.unwrap()
            }));
        }

        let mut admitted = 0u64;
        for handle in handles {
            if let Increment::Admitted(_) = handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert!(admitted <= limit);
        assert_eq!(counter.current("c").await.unwrap(), admitted);
    }

    #[tokio::test]
    async fn test_whitelist_bypasses_storage() {
        let limiter = limiter(1, 1, vec!["192.168.1.100".into()]);
        for _ in 0..20 {
            assert_eq!(
                limiter.check("192.168.1.100").await.unwrap(),
                Admission::Allowed
            );
        }
    }

    #[tokio::test]
    async fn test_identity_limit_enforced_per_identity() {
        let limiter = limiter(100, 2, vec![]);

        assert!(!limiter.check("10.0.0.1").await.unwrap().is_limited());
        assert!(!limiter.check("10.0.0.1").await.unwrap().is_limited());
        assert_eq!(
            limiter.check("10.0.0.1").await.unwrap(),
            Admission::Limited(LimitScope::Identity)
        );

        // A different identity still has capacity.
        assert!(!limiter.check("10.0.0.2").await.unwrap().is_limited());
    }

    #[tokio::test]
    async fn test_global_limit_enforced_across_identities() {
        let limiter = limiter(3, 100, vec![]);

        for i in 0..3 {
            let ip = format!("10.0.1.{}", i);
            assert!(!limiter.check(&ip).await.unwrap().is_limited());
        }
        assert_eq!(
            limiter.check("10.0.1.99").await.unwrap(),
            Admission::Limited(LimitScope::Global)
        );
    }

    #[tokio::test]
    async fn test_identity_rejection_spares_global_counter() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let limiter = RateLimiter::new(
            Arc::clone(&store),
            RateLimitConfig {
                global_limit: 100,
                identity_limit: 1,
                whitelist: vec![],
                identity_salt: "s".into(),
            },
        );

        limiter.check("10.0.0.9").await.unwrap();
        assert!(limiter.check("10.0.0.9").await.unwrap().is_limited());

        // One admitted request, so exactly one global increment.
        let counter = SliceCounter::new(store);
        let global_key = keys::global_counter(Utc::now());
        assert_eq!(counter.current(&global_key).await.unwrap(), 1);
    }
}
