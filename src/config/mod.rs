//! Gateway configuration.
//!
//! All knobs are plain serde structs with per-field defaults, loadable from
//! a YAML or JSON file plus a handful of environment overrides. Provider
//! tables are declarative: they are read once at startup and turned into an
//! immutable [`ProviderRegistry`](crate::registry::ProviderRegistry).

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Maximum number of live cache entries after an eviction pass.
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
    /// Default cache TTL in milliseconds (24 hours).
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,
    /// Minimum token-set Jaccard overlap for a fuzzy cache hit.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Credential cooldown after a rate limit, in milliseconds.
    #[serde(default = "default_rotation_cooldown_ms")]
    pub rotation_cooldown_ms: u64,
    /// Credential cooldown after an auth or unknown failure, in milliseconds.
    #[serde(default = "default_fail_retry_delay_ms")]
    pub fail_retry_delay_ms: u64,
    /// Attempt budget per provider inside one `generate` call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Target cache hit rate; below it the cache accepts entries aggressively.
    #[serde(default = "default_cost_savings_target")]
    pub cost_savings_target: f64,
    /// Per-attempt HTTP timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Overall deadline for one `generate` call; past it the dispatcher goes
    /// straight to the local fallback.
    #[serde(default = "default_overall_deadline_ms")]
    pub overall_deadline_ms: u64,
    /// Interval of the self-healing task that clears session-failed models
    /// and recovers credential pools.
    #[serde(default = "default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,
    /// Where cache contents and analytics are checkpointed. `None` disables
    /// persistence.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Upper bound between snapshot flushes, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Flush early once this many cache mutations accumulated.
    #[serde(default = "default_flush_after_mutations")]
    pub flush_after_mutations: u64,
    /// Flat per-request cost overrides by model id, in dollars.
    #[serde(default)]
    pub model_costs: HashMap<String, f64>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_cache_size: default_max_cache_size(),
            default_ttl_ms: default_ttl_ms(),
            similarity_threshold: default_similarity_threshold(),
            rotation_cooldown_ms: default_rotation_cooldown_ms(),
            fail_retry_delay_ms: default_fail_retry_delay_ms(),
            max_attempts: default_max_attempts(),
            cost_savings_target: default_cost_savings_target(),
            request_timeout_ms: default_request_timeout_ms(),
            overall_deadline_ms: default_overall_deadline_ms(),
            maintenance_interval_ms: default_maintenance_interval_ms(),
            snapshot_path: None,
            flush_interval_ms: default_flush_interval_ms(),
            flush_after_mutations: default_flush_after_mutations(),
            model_costs: HashMap::new(),
            providers: Vec::new(),
        }
    }
}

/// One remote provider: endpoint, auth scheme, ordered model list and the
/// API keys its credential pool is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    #[serde(default)]
    pub auth_scheme: AuthScheme,
    /// Ordered model list; the first entry is the primary model.
    pub models: Vec<String>,
    pub api_keys: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// How a credential is attached to outgoing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>` (OpenAI-compatible endpoints).
    #[default]
    Bearer,
    /// `x-api-key: <key>` header.
    ApiKeyHeader,
}

impl GatewayConfig {
    /// Load configuration from a YAML or JSON file, then apply environment
    /// overrides and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
            _ => serde_json::from_str(&raw)?,
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MODELGATE_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = env::var("MODELGATE_MAX_ATTEMPTS") {
            self.max_attempts = value
                .parse()
                .map_err(|e| GatewayError::Config(format!("Invalid max attempts: {e}")))?;
        }
        if let Ok(value) = env::var("MODELGATE_MAX_CACHE_SIZE") {
            self.max_cache_size = value
                .parse()
                .map_err(|e| GatewayError::Config(format!("Invalid cache size: {e}")))?;
        }
        if let Ok(value) = env::var("MODELGATE_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = value
                .parse()
                .map_err(|e| GatewayError::Config(format!("Invalid similarity threshold: {e}")))?;
        }
        if let Ok(value) = env::var("MODELGATE_SNAPSHOT_PATH") {
            self.snapshot_path = Some(PathBuf::from(value));
        }
        Ok(())
    }

    /// Reject configurations the gateway cannot act on.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(GatewayError::Config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.cost_savings_target) {
            return Err(GatewayError::Config(format!(
                "cost_savings_target must be within [0, 1], got {}",
                self.cost_savings_target
            )));
        }
        if self.max_attempts == 0 {
            return Err(GatewayError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_cache_size == 0 {
            return Err(GatewayError::Config(
                "max_cache_size must be at least 1".to_string(),
            ));
        }
        for provider in &self.providers {
            if provider.id.is_empty() {
                return Err(GatewayError::Config("provider id is empty".to_string()));
            }
            if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://")
            {
                return Err(GatewayError::Config(format!(
                    "provider {} has a non-HTTP base_url: {}",
                    provider.id, provider.base_url
                )));
            }
            if provider.models.is_empty() {
                return Err(GatewayError::Config(format!(
                    "provider {} has no models",
                    provider.id
                )));
            }
            if provider.api_keys.is_empty() {
                return Err(GatewayError::Config(format!(
                    "provider {} has no api_keys",
                    provider.id
                )));
            }
        }
        if self.providers.iter().all(|p| !p.enabled) {
            // Still valid: every call will be served by the local fallback.
            warn!("No enabled providers configured; all responses will use the local fallback");
        }
        Ok(())
    }
}

fn default_max_cache_size() -> usize {
    1000
}

fn default_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_similarity_threshold() -> f64 {
    0.85
}

fn default_rotation_cooldown_ms() -> u64 {
    60_000
}

fn default_fail_retry_delay_ms() -> u64 {
    5 * 60_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_cost_savings_target() -> f64 {
    0.3
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_overall_deadline_ms() -> u64 {
    120_000
}

fn default_maintenance_interval_ms() -> u64 {
    5 * 60_000
}

fn default_flush_interval_ms() -> u64 {
    60_000
}

fn default_flush_after_mutations() -> u64 {
    32
}

fn default_true() -> bool {
    true
}
