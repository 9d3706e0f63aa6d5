//! Shared application state
//!
//! Every collaborator is injected at construction; handlers reach them
//! through clones of this struct. No globals, so tests can assemble a
//! full stack over an in-memory object store.

use mosaic_core::PromptFilter;
use mosaic_jobs::{FanOutExecutor, SessionManager};
use mosaic_providers::ModelRegistry;
use mosaic_store::{ContextLog, RateLimiter};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub filter: Arc<PromptFilter>,
    pub manager: SessionManager,
    pub executor: FanOutExecutor,
    pub context: Arc<ContextLog>,
}
