//! Mosaic API Server Entry Point
//!
//! Loads configuration from the environment, assembles the application
//! state, and serves the Axum router until interrupted.

use mosaic_api::build_state;
use mosaic_core::MosaicConfig;
use mosaic_store::MemoryObjectStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = MosaicConfig::from_env();
    if config.models.is_empty() {
        tracing::warn!("no models configured, generate requests will be rejected");
    }

    // Single-host store; a shared object-store client implementing
    // ObjectStore slots in here for multi-host deployments.
    let store = Arc::new(MemoryObjectStore::new());
    let state = build_state(store, &config);
    let app = mosaic_api::router(state);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));
    tracing::info!(%addr, models = config.models.len(), "starting mosaic api");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::select! {
        result = axum::serve(listener, app) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    }
}
