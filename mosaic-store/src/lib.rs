//! Mosaic Store - Object-Store State Management
//!
//! Everything mutable in Mosaic lives in an object store that offers only
//! whole-object GET/PUT, conditional PUT keyed by an opaque version tag,
//! and prefix LIST. This crate builds the coordination primitives the rest
//! of the system needs on top of that: a versioned CAS record store, atomic
//! per-timeslice counters, a bounded append log, and image storage.
//!
//! No pessimistic locks anywhere; every shared key is coordinated through
//! bounded CAS retries.

pub mod artifacts;
pub mod counter;
pub mod keys;
pub mod object;
pub mod versioned;
pub mod window;

pub use artifacts::ImageStore;
pub use counter::{Admission, Increment, LimitScope, RateLimiter, SliceCounter};
pub use object::{MemoryObjectStore, ObjectStore, Precondition, StoredObject, VersionTag};
pub use versioned::{ConflictPolicy, VersionedRecord, VersionedStore, MAX_CAS_RETRIES};
pub use window::ContextLog;
