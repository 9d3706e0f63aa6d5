//! Configuration types
//!
//! Loaded from environment variables, matching the deployment convention of
//! one numbered variable group per model (`MODEL_{i}_PROVIDER`,
//! `MODEL_{i}_ID`, ...). All collaborators receive their configuration by
//! value; there is no process-wide configuration singleton.

use serde::{Deserialize, Serialize};
use std::env;

/// Configuration for one model column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// 1-based slot index from the environment.
    pub index: usize,
    /// Provider identifier, e.g. "openai" or "bfl".
    pub provider: String,
    /// Provider-side model identifier.
    pub id: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub user_id: Option<String>,
}

impl ModelConfig {
    /// Display name used as the unit-of-work key inside sessions.
    pub fn name(&self) -> &str {
        &self.id
    }
}

/// Rate-limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per hour across all callers.
    pub global_limit: u64,
    /// Maximum requests per day per caller identity.
    pub identity_limit: u64,
    /// Identities that bypass the limiter entirely.
    pub whitelist: Vec<String>,
    /// Salt mixed into identity hashes before they become storage keys.
    pub identity_salt: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_limit: 1000,
            identity_limit: 50,
            whitelist: Vec::new(),
            identity_salt: String::new(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosaicConfig {
    pub rate_limit: RateLimitConfig,
    pub models: Vec<ModelConfig>,
    /// 1-based index of the model used for prompt enhancement
    /// (`PROMPT_MODEL_INDEX`). Reserved for a prompt-rewrite endpoint;
    /// nothing consumes it at serving time yet.
    pub prompt_model_index: usize,
}

impl MosaicConfig {
    /// Load configuration from environment variables.
    ///
    /// Missing or partial model slots are skipped; mismatches between
    /// `MODEL_COUNT` and the slots actually configured are logged, not
    /// fatal, so partial configurations work in test environments.
    pub fn from_env() -> Self {
        let model_count = env_usize("MODEL_COUNT", 9);
        let prompt_model_index = env_usize("PROMPT_MODEL_INDEX", 1);

        let mut models = Vec::new();
        for i in 1..=model_count {
            let provider = env_opt(&format!("MODEL_{}_PROVIDER", i));
            let id = env_opt(&format!("MODEL_{}_ID", i));
            let (Some(provider), Some(id)) = (provider, id) else {
                continue;
            };
            models.push(ModelConfig {
                index: i,
                provider,
                id,
                api_key: env_opt(&format!("MODEL_{}_API_KEY", i)),
                base_url: env_opt(&format!("MODEL_{}_BASE_URL", i)),
                user_id: env_opt(&format!("MODEL_{}_USER_ID", i)),
            });
        }

        if models.len() != model_count {
            tracing::warn!(
                expected = model_count,
                configured = models.len(),
                "MODEL_COUNT does not match configured model slots"
            );
        }
        if !models.is_empty() && (prompt_model_index < 1 || prompt_model_index > models.len()) {
            tracing::warn!(
                prompt_model_index,
                "PROMPT_MODEL_INDEX out of range for configured models"
            );
        }

        let whitelist = env::var("IP_INCLUDE")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Self {
            rate_limit: RateLimitConfig {
                global_limit: env_u64("GLOBAL_LIMIT", 1000),
                identity_limit: env_u64("IP_LIMIT", 50),
                whitelist,
                identity_salt: env::var("IDENTITY_SALT").unwrap_or_default(),
            },
            models,
            prompt_model_index,
        }
    }

    /// The model configured for prompt enhancement, when present.
    /// See [`MosaicConfig::prompt_model_index`]; unused until a
    /// prompt-rewrite endpoint exists.
    pub fn prompt_model(&self) -> Option<&ModelConfig> {
        self.models
            .iter()
            .find(|m| m.index == self.prompt_model_index)
    }
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate_limits() {
        let config = RateLimitConfig::default();
        assert_eq!(config.global_limit, 1000);
        assert_eq!(config.identity_limit, 50);
        assert!(config.whitelist.is_empty());
    }

    #[test]
    fn test_prompt_model_lookup() {
        let config = MosaicConfig {
            rate_limit: RateLimitConfig::default(),
            models: vec![
                ModelConfig {
                    index: 1,
                    provider: "openai".into(),
                    id: "gpt-image-1".into(),
                    api_key: Some("k".into()),
                    base_url: None,
                    user_id: None,
                },
                ModelConfig {
                    index: 2,
                    provider: "bfl".into(),
                    id: "flux-pro".into(),
                    api_key: Some("k".into()),
                    base_url: None,
                    user_id: None,
                },
            ],
            prompt_model_index: 2,
        };
        assert_eq!(config.prompt_model().unwrap().id, "flux-pro");
    }
}
