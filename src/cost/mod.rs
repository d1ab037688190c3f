//! Flat per-model cost table and analytics accumulator.
//!
//! Costs are a flat per-request estimate in dollars, not token-level
//! accounting: enough to rank models, size cache savings and drive the
//! caching policy.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Fallback estimate for models with no table entry.
const DEFAULT_MODEL_COST: f64 = 0.002;

/// Raw analytics counters. Persisted inside gateway snapshots.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AnalyticsCounters {
    pub hits: u64,
    pub misses: u64,
    pub avg_latency_ms: f64,
    pub estimated_savings: f64,
}

/// Analytics view exposed through `get_status`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub avg_latency_ms: f64,
    /// Cumulative dollars not spent thanks to cache hits.
    pub estimated_savings: f64,
    pub cache_entries: usize,
}

/// Per-model flat cost table plus request analytics.
pub struct CostEstimator {
    table: HashMap<String, f64>,
    state: Mutex<AnalyticsCounters>,
}

impl CostEstimator {
    /// Build from configured overrides; unlisted models fall back to
    /// pattern-matched defaults.
    pub fn new(overrides: &HashMap<String, f64>) -> Self {
        Self {
            table: overrides.clone(),
            state: Mutex::new(AnalyticsCounters::default()),
        }
    }

    /// Flat estimated cost of one request against `model`, in dollars.
    pub fn per_model_cost(&self, model: &str) -> f64 {
        if let Some(cost) = self.table.get(model) {
            return *cost;
        }
        let name = model.to_lowercase();
        match name.as_str() {
            m if m.contains("opus") || m.contains("gpt-4-turbo") => 0.03,
            m if m.contains("gpt-4o-mini") || m.contains("haiku") => 0.0005,
            m if m.contains("gpt-4") || m.contains("sonnet") => 0.01,
            m if m.contains("mini") || m.contains("flash") || m.contains("3.5") => 0.001,
            _ => DEFAULT_MODEL_COST,
        }
    }

    /// Record one request. Hits accumulate estimated savings; latency keeps
    /// an incremental mean (`avg += (x - avg) / n`).
    pub fn track_request(&self, is_hit: bool, model: &str, latency_ms: f64) {
        let mut state = self.state.lock();
        if is_hit {
            state.hits += 1;
            state.estimated_savings += self.per_model_cost(model);
        } else {
            state.misses += 1;
        }
        let n = state.hits + state.misses;
        state.avg_latency_ms += (latency_ms - state.avg_latency_ms) / n as f64;
    }

    pub fn report(&self, cache_entries: usize) -> AnalyticsReport {
        let state = self.state.lock();
        let total = state.hits + state.misses;
        AnalyticsReport {
            total_requests: total,
            hits: state.hits,
            misses: state.misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                state.hits as f64 / total as f64
            },
            avg_latency_ms: state.avg_latency_ms,
            estimated_savings: state.estimated_savings,
            cache_entries,
        }
    }

    /// Raw counters, for snapshotting.
    pub fn counters(&self) -> AnalyticsCounters {
        self.state.lock().clone()
    }

    /// Restore counters from a snapshot.
    pub fn restore(&self, counters: AnalyticsCounters) {
        *self.state.lock() = counters;
    }
}
