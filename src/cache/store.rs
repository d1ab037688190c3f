//! The response cache store.

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::key::{cache_key, jaccard, normalize, token_set};
use super::types::{CacheConfig, CacheData, CacheEntry, CacheStats, CachedResponse, Complexity};
use crate::types::SamplingParams;

/// Estimated dollar value above which a response is always worth caching.
const VALUE_THRESHOLD: f64 = 0.0005;

/// Exact + fuzzy lookup over previously produced responses, TTL- and
/// size-bounded.
pub struct ResponseCache {
    config: CacheConfig,
    data: RwLock<CacheData>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        info!(
            max_size = config.max_cache_size,
            threshold = config.similarity_threshold,
            "Initialized response cache"
        );
        Self {
            config,
            data: RwLock::new(CacheData::default()),
        }
    }

    /// Look up a response. Tries the exact key first, then scans live
    /// entries for the same model for a token-set similarity at or above the
    /// configured threshold. Hits update access statistics; expired entries
    /// are never returned.
    pub fn get(
        &self,
        prompt: &str,
        model: &str,
        params: &SamplingParams,
    ) -> Option<CachedResponse> {
        let key = cache_key(prompt, model, params);
        let now = Utc::now();
        let mut data = self.data.write();

        if let Some(entry) = data.entries.get_mut(&key) {
            if !entry.is_expired_at(now) {
                entry.access_count += 1;
                entry.last_accessed = now;
                let response = entry.response.clone();
                Self::record_hit(&mut data.stats, 1.0);
                debug!(%key, "Exact cache hit");
                return Some(response);
            }
        }

        let query = token_set(&normalize(prompt));
        let fuzzy_key = data
            .entries
            .values()
            .filter(|e| e.model == model && !e.is_expired_at(now))
            .find(|e| jaccard(&query, &e.prompt_tokens) >= self.config.similarity_threshold)
            .map(|e| (e.key.clone(), jaccard(&query, &e.prompt_tokens)));

        if let Some((key, similarity)) = fuzzy_key {
            if let Some(entry) = data.entries.get_mut(&key) {
                entry.access_count += 1;
                entry.last_accessed = now;
                let response = entry.response.clone();
                Self::record_hit(&mut data.stats, similarity);
                debug!(similarity, "Fuzzy cache hit");
                return Some(response);
            }
        }

        data.stats.misses += 1;
        None
    }

    fn record_hit(stats: &mut CacheStats, similarity: f64) {
        stats.hits += 1;
        stats.avg_hit_similarity +=
            (similarity - stats.avg_hit_similarity) / stats.hits as f64;
    }

    /// Insert or overwrite the entry for this exact key. Last writer wins;
    /// cache values are idempotent functions of their key. Exceeding the
    /// size bound triggers an eviction pass.
    pub fn set(
        &self,
        prompt: &str,
        model: &str,
        params: &SamplingParams,
        response: CachedResponse,
        ttl_ms: Option<u64>,
    ) {
        let key = cache_key(prompt, model, params);
        let now = Utc::now();
        let ttl = Duration::milliseconds(ttl_ms.unwrap_or(self.config.default_ttl_ms) as i64);
        let entry = CacheEntry {
            key: key.clone(),
            model: model.to_string(),
            prompt_tokens: token_set(&normalize(prompt)),
            response,
            created_at: now,
            expires_at: now + ttl,
            access_count: 0,
            last_accessed: now,
        };

        let mut data = self.data.write();
        data.entries.insert(key, entry);
        data.mutations += 1;
        if data.entries.len() > self.config.max_cache_size {
            self.evict_locked(&mut data);
        }
    }

    /// Drop all expired entries; if still over capacity, remove the lowest
    /// 10% ranked by access count ascending, then age (oldest first).
    pub fn evict(&self) {
        let mut data = self.data.write();
        self.evict_locked(&mut data);
    }

    fn evict_locked(&self, data: &mut CacheData) {
        let now = Utc::now();
        let before = data.entries.len();
        data.entries.retain(|_, e| !e.is_expired_at(now));
        let expired = before - data.entries.len();

        let mut removed = expired as u64;
        if data.entries.len() > self.config.max_cache_size {
            let len = data.entries.len();
            let batch = (len as f64 * 0.1).ceil() as usize;
            let evict_count = batch.max(len - self.config.max_cache_size);

            let mut ranked: Vec<(String, u64, chrono::DateTime<Utc>)> = data
                .entries
                .values()
                .map(|e| (e.key.clone(), e.access_count, e.created_at))
                .collect();
            ranked.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));

            for (key, _, _) in ranked.into_iter().take(evict_count) {
                data.entries.remove(&key);
            }
            removed += evict_count as u64;
        }

        if removed > 0 {
            data.stats.evictions += removed;
            data.mutations += 1;
            info!(expired, total = removed, "Evicted cache entries");
        }
    }

    /// Whether a response is worth caching: high modeled value, high
    /// complexity, or a running hit rate still below the savings target.
    pub fn should_cache(
        &self,
        model_cost: f64,
        response_length: usize,
        complexity: Complexity,
    ) -> bool {
        let estimated_value = model_cost * response_length as f64 / 1000.0;
        if estimated_value >= VALUE_THRESHOLD || complexity == Complexity::High {
            return true;
        }
        let stats = &self.data.read().stats;
        let total = stats.hits + stats.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            stats.hits as f64 / total as f64
        };
        hit_rate < self.config.cost_savings_target
    }

    pub fn len(&self) -> usize {
        self.data.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.data.read().stats.clone()
    }

    pub fn clear(&self) {
        let mut data = self.data.write();
        data.entries.clear();
        data.stats = CacheStats::default();
        data.mutations += 1;
    }

    /// All live entries, for snapshotting.
    pub fn export_entries(&self) -> Vec<CacheEntry> {
        let now = Utc::now();
        self.data
            .read()
            .entries
            .values()
            .filter(|e| !e.is_expired_at(now))
            .cloned()
            .collect()
    }

    /// Replace the store contents from a snapshot, discarding entries that
    /// expired while the gateway was down.
    pub fn restore(&self, entries: Vec<CacheEntry>) {
        let now = Utc::now();
        let mut data = self.data.write();
        data.entries.clear();
        for entry in entries {
            if !entry.is_expired_at(now) {
                data.entries.insert(entry.key.clone(), entry);
            }
        }
        info!(entries = data.entries.len(), "Restored cache from snapshot");
    }

    /// Mutations since the last call, for flush scheduling.
    pub fn take_mutations(&self) -> u64 {
        let mut data = self.data.write();
        std::mem::take(&mut data.mutations)
    }
}
