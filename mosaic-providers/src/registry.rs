//! Model registry
//!
//! Maps configured model slots to adapter instances. One adapter exists
//! per backend family and is shared across all models routed to it, so
//! the executor can fan out over the registry without constructing
//! clients per request.

use crate::detect::{detect_provider, ProviderKind};
use crate::providers::{BflAdapter, GeminiAdapter, GenericAdapter, OpenAiAdapter};
use crate::ProviderAdapter;
use mosaic_core::ModelConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// The set of configured models and the adapters that serve them.
pub struct ModelRegistry {
    models: Vec<ModelConfig>,
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
    prompt_model_index: usize,
}

impl ModelRegistry {
    /// Build a registry with the standard adapter per backend family.
    pub fn new(models: Vec<ModelConfig>, prompt_model_index: usize) -> Self {
        let mut adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(ProviderKind::OpenAi, Arc::new(OpenAiAdapter::new()));
        adapters.insert(ProviderKind::Gemini, Arc::new(GeminiAdapter::new()));
        adapters.insert(ProviderKind::Bfl, Arc::new(BflAdapter::new()));
        adapters.insert(ProviderKind::Generic, Arc::new(GenericAdapter::new()));
        Self {
            models,
            adapters,
            prompt_model_index,
        }
    }

    /// Replace the adapter for one backend family. Used by tests to
    /// substitute scripted adapters without touching the wire.
    pub fn with_adapter(mut self, kind: ProviderKind, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(kind, adapter);
        self
    }

    /// All configured models, in slot order.
    pub fn all(&self) -> &[ModelConfig] {
        &self.models
    }

    /// Look up a model by its 1-based slot index.
    pub fn by_index(&self, index: usize) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.index == index)
    }

    /// Look up a model by its display name.
    pub fn by_name(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name() == name)
    }

    /// The model configured for prompt enhancement, when present.
    ///
    /// No handler calls this yet; it is the lookup a prompt-rewrite
    /// endpoint would route through once one ships, kept so the
    /// `PROMPT_MODEL_INDEX` configuration resolves against the same
    /// registry as everything else.
    pub fn prompt_model(&self) -> Option<&ModelConfig> {
        self.by_index(self.prompt_model_index)
    }

    /// Resolve the adapter serving a model. Explicit provider config wins;
    /// otherwise the model name is sniffed.
    pub fn adapter_for(&self, model: &ModelConfig) -> Arc<dyn ProviderAdapter> {
        let kind = if model.provider.is_empty() {
            detect_provider(model.name())
        } else {
            ProviderKind::from_name(&model.provider)
        };
        match self
            .adapters
            .get(&kind)
            .or_else(|| self.adapters.get(&ProviderKind::Generic))
        {
            Some(adapter) => Arc::clone(adapter),
            None => Arc::new(GenericAdapter::new()),
        }
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.models.len())
            .field("prompt_model_index", &self.prompt_model_index)
            .finish()
    }
}
