//! Cache entry and configuration types.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::types::Usage;

/// The cached payload: enough to reconstruct a full `GenerateResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub content: String,
    /// Provider that originally served the response.
    pub provider: String,
    /// Model that originally served the response.
    pub model: String,
    pub usage: Usage,
}

/// One cache entry. Serializable so snapshots can persist the whole store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Exact key: hash of normalized prompt + model + sampling params.
    pub key: String,
    /// Model the request was keyed under, used to scope fuzzy matching.
    pub model: String,
    /// Token set of the normalized prompt, for Jaccard comparison.
    pub prompt_tokens: BTreeSet<String>,
    pub response: CachedResponse,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Coarse prompt complexity used by the caching policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Cache tuning, extracted from the gateway configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_cache_size: usize,
    pub default_ttl_ms: u64,
    pub similarity_threshold: f64,
    /// Target hit rate; while the running hit rate is below it, the cache
    /// accepts low-value entries too.
    pub cost_savings_target: f64,
}

impl From<&GatewayConfig> for CacheConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_cache_size: config.max_cache_size,
            default_ttl_ms: config.default_ttl_ms,
            similarity_threshold: config.similarity_threshold,
            cost_savings_target: config.cost_savings_target,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Average similarity score across hits (1.0 for exact hits).
    pub avg_hit_similarity: f64,
}

/// Entries and statistics behind a single lock.
#[derive(Debug, Default)]
pub(super) struct CacheData {
    pub entries: HashMap<String, CacheEntry>,
    pub stats: CacheStats,
    /// Mutations since the last snapshot flush.
    pub mutations: u64,
}
