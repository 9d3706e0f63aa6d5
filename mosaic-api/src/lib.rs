//! Mosaic API - HTTP Surface
//!
//! Axum router over the generation stack: moderation and rate-limit gates,
//! session creation, background fan-out, and status/context queries. All
//! collaborators are injected through [`AppState`]; the binary wires them
//! up over a concrete object store, tests over the in-memory one.

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;

use mosaic_core::{MosaicConfig, PromptFilter};
use mosaic_jobs::{FanOutExecutor, SessionManager};
use mosaic_providers::ModelRegistry;
use mosaic_store::{ContextLog, ImageStore, ObjectStore, RateLimiter};
use std::sync::Arc;

/// Assemble the full application state over an object store.
pub fn build_state(store: Arc<dyn ObjectStore>, config: &MosaicConfig) -> AppState {
    let registry = Arc::new(ModelRegistry::new(
        config.models.clone(),
        config.prompt_model_index,
    ));
    let manager = SessionManager::new(Arc::clone(&store));
    let context = Arc::new(ContextLog::new(Arc::clone(&store)));
    let executor = FanOutExecutor::new(
        manager.clone(),
        Arc::clone(&registry),
        Arc::new(ImageStore::new(Arc::clone(&store))),
        Arc::clone(&context),
    );
    AppState {
        registry,
        limiter: Arc::new(RateLimiter::new(
            Arc::clone(&store),
            config.rate_limit.clone(),
        )),
        filter: Arc::new(PromptFilter::new()),
        manager,
        executor,
        context,
    }
}
