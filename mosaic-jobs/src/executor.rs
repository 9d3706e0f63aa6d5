//! Fan-out executor
//!
//! Runs one prompt across every enabled model column concurrently. Each
//! column is an isolated unit of work: it times out on its own clock,
//! records its own success or failure through the session manager, and
//! never disturbs its siblings. The executor returns once every unit is
//! terminal; a partially failed run is a normal outcome, not an error.

use crate::manager::SessionManager;
use mosaic_core::{ContextEntry, ModelConfig, SessionError, SessionId, SessionRecord};
use mosaic_providers::{redact_secrets, GenerationParams, ModelRegistry};
use mosaic_store::{ContextLog, ImageStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Maximum units of work in flight per run.
pub const MAX_WORKERS: usize = 10;

/// Wall-clock budget for a single model call.
pub const MODEL_TIMEOUT_SECS: u64 = 120;

/// Outcome of a single refinement iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Completed { index: usize, image_key: String },
    Failed { index: usize, error: String },
}

/// Fans a generation run out across model columns.
#[derive(Clone)]
pub struct FanOutExecutor {
    manager: SessionManager,
    registry: Arc<ModelRegistry>,
    images: Arc<ImageStore>,
    context: Arc<ContextLog>,
    model_timeout: Duration,
}

impl FanOutExecutor {
    pub fn new(
        manager: SessionManager,
        registry: Arc<ModelRegistry>,
        images: Arc<ImageStore>,
        context: Arc<ContextLog>,
    ) -> Self {
        Self {
            manager,
            registry,
            images,
            context,
            model_timeout: Duration::from_secs(MODEL_TIMEOUT_SECS),
        }
    }

    /// Override the per-unit timeout. Tests shrink it to milliseconds to
    /// exercise the timeout path without waiting two minutes.
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Run the session's prompt against every enabled model column and
    /// return the final record once all columns are terminal.
    pub async fn execute(
        &self,
        session_id: SessionId,
        params: GenerationParams,
    ) -> Result<SessionRecord, SessionError> {
        let record = self
            .manager
            .session(session_id)
            .await?
            .ok_or(SessionError::SessionNotFound { session_id })?;

        let units: Vec<ModelConfig> = self
            .registry
            .all()
            .iter()
            .filter(|config| {
                record
                    .slot(config.name())
                    .map(|slot| slot.enabled)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        tracing::info!(%session_id, units = units.len(), "starting fan-out");
        let semaphore = Arc::new(Semaphore::new(MAX_WORKERS.min(units.len().max(1))));

        let mut handles = Vec::with_capacity(units.len());
        for config in units {
            let executor = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let prompt = record.prompt.clone();
            let params = params.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                executor.run_unit(session_id, config, prompt, params).await;
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(%session_id, error = %e, "fan-out task panicked");
            }
        }

        self.manager
            .session(session_id)
            .await?
            .ok_or(SessionError::SessionNotFound { session_id })
    }

    /// One unit of work. Every outcome, including our own storage
    /// failures, ends with the unit in a terminal state.
    async fn run_unit(
        &self,
        session_id: SessionId,
        config: ModelConfig,
        prompt: String,
        params: GenerationParams,
    ) {
        let model = config.name().to_string();
        if let Err(e) = self.manager.mark_in_progress(session_id, &model).await {
            tracing::error!(%session_id, model, error = %e, "could not start unit");
            return;
        }

        let started = Instant::now();
        let adapter = self.registry.adapter_for(&config);
        let generated = tokio::time::timeout(
            self.model_timeout,
            adapter.generate(&config, &prompt, &params),
        )
        .await;

        let outcome = match generated {
            Ok(Ok(image)) => {
                let duration = started.elapsed().as_secs_f64();
                match self
                    .images
                    .save(image.bytes, &image.media_type, &session_id.to_string(), &model)
                    .await
                {
                    Ok(image_key) => {
                        let entry = ContextEntry::new(0, prompt.clone(), image_key.clone());
                        if let Err(e) = self.context.append(session_id, &model, entry).await {
                            tracing::warn!(%session_id, model, error = %e, "context append failed");
                        }
                        self.manager
                            .mark_complete(session_id, &model, &image_key, duration)
                            .await
                    }
                    Err(e) => {
                        self.manager
                            .mark_error(session_id, &model, &format!("image storage failed: {}", e))
                            .await
                    }
                }
            }
            Ok(Err(e)) => {
                let message = self.sanitized(&config, &e.to_string());
                tracing::warn!(%session_id, model, error = message, "unit failed");
                self.manager.mark_error(session_id, &model, &message).await
            }
            Err(_) => {
                let message = format!("timed out after {}s", self.model_timeout.as_secs());
                tracing::warn!(%session_id, model, "unit timed out");
                self.manager.mark_error(session_id, &model, &message).await
            }
        };

        if let Err(e) = outcome {
            tracing::error!(%session_id, model, error = %e, "could not record unit outcome");
        }
    }

    /// Run one refinement iteration against a single model column.
    ///
    /// Once `begin_iteration` has opened the iteration, every failure
    /// path closes it through `fail_iteration`; nothing may leave the
    /// column stranded in progress.
    pub async fn execute_iteration(
        &self,
        session_id: SessionId,
        model: &str,
        prompt: &str,
    ) -> Result<IterationOutcome, SessionError> {
        let config = self
            .registry
            .by_name(model)
            .ok_or_else(|| SessionError::ModelNotFound {
                session_id,
                model: model.to_string(),
            })?
            .clone();

        let index = self.manager.begin_iteration(session_id, model, prompt).await?;

        match self.refine(session_id, &config, model, prompt, index).await {
            Ok(image_key) => Ok(IterationOutcome::Completed { index, image_key }),
            Err(message) => {
                self.manager
                    .fail_iteration(session_id, model, index, &message)
                    .await?;
                Ok(IterationOutcome::Failed { index, error: message })
            }
        }
    }

    /// The fallible body of an iteration: source fetch, adapter call,
    /// artifact save, iteration close. Every error comes back as the
    /// sanitized message to record against the open iteration.
    async fn refine(
        &self,
        session_id: SessionId,
        config: &ModelConfig,
        model: &str,
        prompt: &str,
        index: usize,
    ) -> Result<String, String> {
        let source = match self.manager.latest_image_key(session_id, model).await {
            Ok(Some(key)) => self
                .images
                .fetch(&key)
                .await
                .map_err(|e| format!("source image unavailable: {}", e))?,
            Ok(None) => Vec::new(),
            Err(e) => return Err(format!("source image unavailable: {}", e)),
        };
        // Fail open on the advisory context window.
        let context = match self.context.window(session_id, model).await {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!(%session_id, model, error = %e, "context window unavailable");
                Vec::new()
            }
        };

        let started = Instant::now();
        let adapter = self.registry.adapter_for(config);
        let edited = tokio::time::timeout(
            self.model_timeout,
            adapter.edit(config, &source, prompt, &context),
        )
        .await;

        let image = match edited {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => return Err(self.sanitized(config, &e.to_string())),
            Err(_) => {
                return Err(format!("timed out after {}s", self.model_timeout.as_secs()))
            }
        };

        let duration = started.elapsed().as_secs_f64();
        let image_key = self
            .images
            .save(image.bytes, &image.media_type, &session_id.to_string(), model)
            .await
            .map_err(|e| format!("image storage failed: {}", e))?;
        self.manager
            .complete_iteration(session_id, model, index, &image_key, duration)
            .await
            .map_err(|e| format!("could not record iteration outcome: {}", e))?;
        // Context iteration 0 is the original render, so the nth
        // refinement logs as n + 1.
        let entry = ContextEntry::new(index + 1, prompt, image_key.clone());
        if let Err(e) = self.context.append(session_id, model, entry).await {
            tracing::warn!(%session_id, model, error = %e, "context append failed");
        }
        Ok(image_key)
    }

    fn sanitized(&self, config: &ModelConfig, message: &str) -> String {
        let secrets: Vec<&str> = config.api_key.as_deref().into_iter().collect();
        redact_secrets(message, &secrets)
    }
}

impl std::fmt::Debug for FanOutExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutExecutor")
            .field("model_timeout", &self.model_timeout)
            .finish()
    }
}
