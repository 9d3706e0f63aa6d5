//! Versioned record store with compare-and-swap semantics
//!
//! Generic read-modify-write over single JSON documents. Every successful
//! write increments the record's `version` field and is guarded by the
//! object store's conditional-write tag, so a writer that read version v
//! only commits if the store still holds v. Conflicts are retried a bounded
//! number of times with a short jittered delay; what happens when retries
//! run out is an explicit, per-store policy rather than a silent default.

use crate::object::{ObjectStore, Precondition, VersionTag};
use mosaic_core::{ContextWindowRecord, CounterRecord, SessionRecord, StoreError};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Maximum CAS attempts per mutation.
pub const MAX_CAS_RETRIES: u32 = 3;

/// Base delay between CAS attempts, in milliseconds.
const RETRY_BASE_DELAY_MS: u64 = 50;

/// Jitter added to the base delay to de-synchronize racing writers.
const RETRY_JITTER_MS: u64 = 25;

/// A record that participates in optimistic locking.
pub trait VersionedRecord: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Current optimistic-locking version.
    fn version(&self) -> u64;

    /// Overwrite the version counter.
    fn set_version(&mut self, version: u64);

    /// Advance the advisory `updated_at` timestamp. Not used for
    /// concurrency control.
    fn touch(&mut self);
}

impl VersionedRecord for SessionRecord {
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

impl VersionedRecord for CounterRecord {
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

impl VersionedRecord for ContextWindowRecord {
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

/// What to do when CAS retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Surface [`StoreError::RetryExhausted`] to the caller.
    Surface,
    /// Overwrite unconditionally with the last locally computed record.
    /// This sacrifices the lost-update guarantee for availability and is
    /// only appropriate for low-stakes display state.
    LastWriterWins,
}

/// CAS wrapper over one record kind.
pub struct VersionedStore<T> {
    store: Arc<dyn ObjectStore>,
    policy: ConflictPolicy,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for VersionedStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy,
            _record: PhantomData,
        }
    }
}

impl<T: VersionedRecord> VersionedStore<T> {
    /// New store that surfaces exhausted retries as errors.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_policy(store, ConflictPolicy::Surface)
    }

    /// New store with an explicit conflict policy.
    pub fn with_policy(store: Arc<dyn ObjectStore>, policy: ConflictPolicy) -> Self {
        Self {
            store,
            policy,
            _record: PhantomData,
        }
    }

    /// Read a record and its version tag.
    pub async fn load(&self, key: &str) -> Result<Option<(T, VersionTag)>, StoreError> {
        let Some(object) = self.store.get(key).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&object.bytes).map_err(|e| {
            StoreError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Some((record, object.tag)))
    }

    /// Write a new record, conditional on the key being absent.
    pub async fn create(&self, key: &str, record: &T) -> Result<VersionTag, StoreError> {
        let bytes = self.encode(key, record)?;
        self.store.put_if(key, bytes, Precondition::Absent).await
    }

    /// Conditional write: tag match when a tag is known, create-if-absent
    /// otherwise.
    pub async fn write_if(
        &self,
        key: &str,
        record: &T,
        tag: Option<&VersionTag>,
    ) -> Result<VersionTag, StoreError> {
        let bytes = self.encode(key, record)?;
        let precondition = match tag {
            Some(tag) => Precondition::TagMatches(tag.clone()),
            None => Precondition::Absent,
        };
        self.store.put_if(key, bytes, precondition).await
    }

    /// Unconditional write. Escape hatch for the last-writer-wins fallback;
    /// ordinary mutations never call this directly.
    pub async fn write_unconditional(
        &self,
        key: &str,
        record: &T,
    ) -> Result<VersionTag, StoreError> {
        let bytes = self.encode(key, record)?;
        self.store.put(key, bytes).await
    }

    /// Read-modify-write an existing record.
    ///
    /// The closure sees the freshest copy on every attempt. A closure error
    /// aborts without writing and without retrying; only CAS conflicts
    /// retry. Absent records are [`StoreError::NotFound`] - update paths
    /// never create.
    pub async fn mutate<F, E>(&self, key: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut(&mut T) -> Result<(), E> + Send,
        E: From<StoreError> + Send,
    {
        let mut last_computed: Option<T> = None;

        for attempt in 1..=MAX_CAS_RETRIES {
            let Some((mut record, tag)) = self.load(key).await? else {
                return Err(StoreError::NotFound {
                    key: key.to_string(),
                }
                .into());
            };

            let read_version = record.version();
            f(&mut record)?;
            record.set_version(read_version + 1);
            record.touch();

            match self.write_if(key, &record, Some(&tag)).await {
                Ok(_) => return Ok(record),
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(key, attempt, "CAS conflict, retrying");
                    last_computed = Some(record);
                    backoff().await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.on_exhausted(key, last_computed).await
    }

    /// Read-modify-write that initializes the record when the key is
    /// absent (create-if-absent CAS).
    pub async fn upsert<I, F, E>(&self, key: &str, init: I, mut f: F) -> Result<T, E>
    where
        I: Fn() -> T + Send + Sync,
        F: FnMut(&mut T) -> Result<(), E> + Send,
        E: From<StoreError> + Send,
    {
        let mut last_computed: Option<T> = None;

        for attempt in 1..=MAX_CAS_RETRIES {
            let (mut record, tag) = match self.load(key).await? {
                Some((record, tag)) => (record, Some(tag)),
                None => (init(), None),
            };

            let read_version = record.version();
            f(&mut record)?;
            if tag.is_some() {
                record.set_version(read_version + 1);
            }
            record.touch();

            match self.write_if(key, &record, tag.as_ref()).await {
                Ok(_) => return Ok(record),
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(key, attempt, "CAS conflict, retrying");
                    last_computed = Some(record);
                    backoff().await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.on_exhausted(key, last_computed).await
    }

    async fn on_exhausted<E>(&self, key: &str, last_computed: Option<T>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let exhausted = StoreError::RetryExhausted {
            key: key.to_string(),
            attempts: MAX_CAS_RETRIES,
        };
        match (self.policy, last_computed) {
            (ConflictPolicy::LastWriterWins, Some(record)) => {
                tracing::warn!(
                    key,
                    attempts = MAX_CAS_RETRIES,
                    "CAS retries exhausted, overwriting last-writer-wins"
                );
                self.write_unconditional(key, &record).await?;
                Ok(record)
            }
            _ => Err(exhausted.into()),
        }
    }

    fn encode(&self, key: &str, record: &T) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec_pretty(record).map_err(|e| StoreError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Short jittered delay between CAS attempts. The jitter de-synchronizes
/// workers that all collided on the same write.
pub(crate) async fn backoff() {
    let jitter = rand::rng().random_range(0..=RETRY_JITTER_MS);
    tokio::time::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS + jitter)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::MemoryObjectStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use mosaic_core::Timestamp;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestRecord {
        version: u64,
        value: u64,
        updated_at: Timestamp,
    }

    impl TestRecord {
        fn new() -> Self {
            Self {
                version: 1,
                value: 0,
                updated_at: Utc::now(),
            }
        }
    }

    impl VersionedRecord for TestRecord {
        fn version(&self) -> u64 {
            self.version
        }
        fn set_version(&mut self, version: u64) {
            self.version = version;
        }
        fn touch(&mut self) {
            self.updated_at = Utc::now();
        }
    }

    /// Object store whose conditional writes always lose. Unconditional
    /// writes still land, so the last-writer-wins fallback is observable.
    struct ContendedStore {
        inner: MemoryObjectStore,
    }

    #[async_trait]
    impl ObjectStore for ContendedStore {
        async fn get(&self, key: &str) -> Result<Option<crate::StoredObject>, StoreError> {
            self.inner.get(key).await
        }
        async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<VersionTag, StoreError> {
            self.inner.put(key, bytes).await
        }
        async fn put_if(
            &self,
            key: &str,
            _bytes: Vec<u8>,
            _precondition: Precondition,
        ) -> Result<VersionTag, StoreError> {
            Err(StoreError::Conflict {
                key: key.to_string(),
            })
        }
        async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list(prefix).await
        }
        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_create_then_mutate() {
        let store = VersionedStore::<TestRecord>::new(Arc::new(MemoryObjectStore::new()));
        store.create("k", &TestRecord::new()).await.unwrap();

        let updated: TestRecord = store
            .mutate("k", |r| {
                r.value += 10;
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();
        assert_eq!(updated.value, 10);
        assert_eq!(updated.version, 2);

        let (loaded, _) = store.load("k").await.unwrap().unwrap();
        assert_eq!(loaded, updated);
    }

    #[tokio::test]
    async fn test_mutate_missing_record_is_not_found() {
        let store = VersionedStore::<TestRecord>::new(Arc::new(MemoryObjectStore::new()));
        let err = store
            .mutate("missing", |_| Ok::<_, StoreError>(()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let store = VersionedStore::<TestRecord>::new(Arc::new(MemoryObjectStore::new()));
        store.create("k", &TestRecord::new()).await.unwrap();
        let err = store.create("k", &TestRecord::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_closure_error_aborts_without_write() {
        let store = VersionedStore::<TestRecord>::new(Arc::new(MemoryObjectStore::new()));
        store.create("k", &TestRecord::new()).await.unwrap();

        let err = store
            .mutate("k", |_| {
                Err::<(), StoreError>(StoreError::Backend {
                    reason: "domain rule violated".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));

        let (loaded, _) = store.load("k").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.value, 0);
    }

    #[tokio::test]
    async fn test_upsert_initializes_absent_record() {
        let store = VersionedStore::<TestRecord>::new(Arc::new(MemoryObjectStore::new()));
        let record = store
            .upsert("k", TestRecord::new, |r| {
                r.value = 7;
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();
        assert_eq!(record.value, 7);
        assert_eq!(record.version, 1);

        let record = store
            .upsert("k", TestRecord::new, |r| {
                r.value += 1;
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();
        assert_eq!(record.value, 8);
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_by_default() {
        let contended = Arc::new(ContendedStore {
            inner: MemoryObjectStore::new(),
        });
        contended
            .put(
                "k",
                serde_json::to_vec(&TestRecord::new()).unwrap(),
            )
            .await
            .unwrap();

        let store = VersionedStore::<TestRecord>::new(contended);
        let err = store
            .mutate("k", |r| {
                r.value += 1;
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::RetryExhausted {
                key: "k".into(),
                attempts: MAX_CAS_RETRIES
            }
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_last_writer_wins_fallback() {
        let contended = Arc::new(ContendedStore {
            inner: MemoryObjectStore::new(),
        });
        contended
            .put(
                "k",
                serde_json::to_vec(&TestRecord::new()).unwrap(),
            )
            .await
            .unwrap();

        let store = VersionedStore::<TestRecord>::with_policy(
            contended,
            ConflictPolicy::LastWriterWins,
        );
        let record = store
            .mutate("k", |r| {
                r.value += 1;
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();
        assert_eq!(record.value, 1);

        let (loaded, _) = store.load("k").await.unwrap().unwrap();
        assert_eq!(loaded.value, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mutations_never_lose_updates() {
        let store = Arc::new(VersionedStore::<TestRecord>::new(Arc::new(
            MemoryObjectStore::new(),
        )));
        store.create("k", &TestRecord::new()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .mutate("k", |r| {
                        r.value += 1;
                        Ok::<_, StoreError>(())
                    })
                    .await
            }));
        }

        let mut successes = 0u64;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        // Every update that reported success is present in the final
        // record: version counts writes, value counts applied increments.
        let (record, _) = store.load("k").await.unwrap().unwrap();
        assert_eq!(record.value, successes);
        assert_eq!(record.version, 1 + successes);
        assert!(successes >= 1);
    }
}
