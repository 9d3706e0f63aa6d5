//! Mosaic Jobs - Session Lifecycle and Fan-Out Execution
//!
//! The session manager owns every mutation of persisted session records;
//! the executor fans a prompt out across the configured model columns and
//! reports each column's outcome back through the manager. Neither holds
//! in-process session state: the object store is the only source of truth,
//! so any number of executor hosts can cooperate on the same session.

pub mod executor;
pub mod manager;

pub use executor::{FanOutExecutor, IterationOutcome, MAX_WORKERS, MODEL_TIMEOUT_SECS};
pub use manager::SessionManager;
