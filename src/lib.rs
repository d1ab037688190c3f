//! modelgate is a resilient gateway for AI text-generation providers.
//!
//! One [`Gateway::generate`] call hides credential rotation, provider and
//! model failover, a similarity-aware response cache and cost tracking
//! behind a single infallible entry point: when every remote combination is
//! exhausted the gateway answers with deterministic locally generated text
//! instead of an error.
//!
//! ```no_run
//! use modelgate::{Gateway, GatewayConfig, GenerateOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GatewayConfig::from_file("modelgate.yaml")?;
//!     let gateway = Gateway::new(config)?;
//!     gateway.start_background_tasks();
//!
//!     let response = gateway
//!         .generate("Summarize the CAP theorem", &GenerateOptions::default())
//!         .await;
//!     println!("[{}/{}] {}", response.provider, response.model, response.content);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod cost;
pub mod dispatch;
pub mod error;
pub mod pool;
pub mod registry;
pub mod snapshot;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub use crate::cache::{CacheStats, ResponseCache};
pub use crate::config::{AuthScheme, GatewayConfig, ProviderConfig};
pub use crate::cost::{AnalyticsReport, CostEstimator};
pub use crate::dispatch::{
    CompletionBackend, Dispatcher, ProviderClient, RemoteCompletion, FALLBACK_MODEL,
    FALLBACK_PROVIDER,
};
pub use crate::error::{FailureClass, GatewayError, ProviderError, Result};
pub use crate::pool::{CredentialPool, CredentialStats, CredentialStatus};
pub use crate::registry::ProviderRegistry;
pub use crate::snapshot::GatewaySnapshot;
pub use crate::types::{
    GenerateOptions, GenerateResponse, GatewayStatus, ProviderStatus, SamplingParams, Usage,
};

/// Facade over the dispatcher, cache, cost estimator and snapshot layer.
///
/// Construction is synchronous; background maintenance and flushing start
/// only when [`start_background_tasks`](Gateway::start_background_tasks) is
/// called, so embedders that drive their own schedules can skip it.
pub struct Gateway {
    config: GatewayConfig,
    cache: Arc<ResponseCache>,
    cost: Arc<CostEstimator>,
    dispatcher: Arc<Dispatcher>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    /// Build a gateway with the default HTTP backend.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let backend = Arc::new(ProviderClient::new(timeout)?);
        Self::with_backend(config, backend)
    }

    /// Build a gateway over a custom [`CompletionBackend`]. Used by tests
    /// and by embedders that bring their own transport.
    pub fn with_backend(
        config: GatewayConfig,
        backend: Arc<dyn CompletionBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ProviderRegistry::from_config(&config.providers));
        let pools = config
            .providers
            .iter()
            .map(|p| {
                (
                    p.id.clone(),
                    Arc::new(CredentialPool::new(
                        &p.id,
                        &p.api_keys,
                        config.rotation_cooldown_ms,
                        config.fail_retry_delay_ms,
                    )),
                )
            })
            .collect::<HashMap<_, _>>();

        let cache = Arc::new(ResponseCache::new((&config).into()));
        let cost = Arc::new(CostEstimator::new(&config.model_costs));

        if let Some(path) = &config.snapshot_path {
            if let Some(snapshot) = GatewaySnapshot::load_or_cold(path) {
                cache.restore(snapshot.entries);
                cost.restore(snapshot.analytics);
            }
        }
        // Restoring counts as mutations; don't trigger an immediate flush.
        cache.take_mutations();

        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            pools,
            Arc::clone(&cache),
            Arc::clone(&cost),
            backend,
            &config,
        ));

        info!(
            providers = config.providers.len(),
            cache_entries = cache.len(),
            "Gateway initialized"
        );
        Ok(Self {
            config,
            cache,
            cost,
            dispatcher,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the maintenance and snapshot-flush tasks. Idempotent callers
    /// should invoke this once; handles are aborted on [`shutdown`](Gateway::shutdown).
    pub fn start_background_tasks(&self) {
        let mut tasks = self.tasks.lock();
        tasks.push(
            Arc::clone(&self.dispatcher)
                .start_maintenance_task(Duration::from_millis(self.config.maintenance_interval_ms)),
        );
        if self.config.snapshot_path.is_some() {
            tasks.push(self.start_flush_task());
        }
    }

    /// Flush loop: checkpoints once enough mutations accumulated, and at
    /// least every `flush_interval_ms` while anything changed.
    fn start_flush_task(&self) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let cost = Arc::clone(&self.cost);
        let config = self.config.clone();
        tokio::spawn(async move {
            let flush_interval = Duration::from_millis(config.flush_interval_ms);
            let poll = Duration::from_millis((config.flush_interval_ms / 10).clamp(100, 5_000));
            let mut pending: u64 = 0;
            let mut last_flush = Instant::now();
            let mut interval = tokio::time::interval(poll);
            interval.tick().await;
            loop {
                interval.tick().await;
                pending += cache.take_mutations();
                let due = pending >= config.flush_after_mutations
                    || (pending > 0 && last_flush.elapsed() >= flush_interval);
                if !due {
                    continue;
                }
                if let Some(path) = &config.snapshot_path {
                    let snapshot = GatewaySnapshot::new(cache.export_entries(), cost.counters());
                    match snapshot.save(path) {
                        Ok(()) => {
                            debug!(mutations = pending, "Flushed snapshot");
                            pending = 0;
                            last_flush = Instant::now();
                        }
                        Err(err) => error!(error = %err, "Snapshot flush failed"),
                    }
                }
            }
        })
    }

    /// Route one prompt through cache, providers and the local fallback.
    pub async fn generate(&self, prompt: &str, options: &GenerateOptions) -> GenerateResponse {
        self.dispatcher.generate(prompt, options).await
    }

    /// Current routing, credential and analytics state.
    pub fn get_status(&self) -> GatewayStatus {
        self.dispatcher.get_status()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Clear the session-scoped failed-models set so excluded models are
    /// retried immediately.
    pub fn reset_failed_models(&self) {
        self.dispatcher.reset_failed_models();
    }

    /// Force every credential back to available, ignoring cooldowns.
    pub fn reset_failed_credentials(&self) {
        self.dispatcher.reset_failed_credentials();
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Checkpoint cache contents and analytics to the configured snapshot
    /// path. No-op when persistence is disabled.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.config.snapshot_path else {
            return Ok(());
        };
        self.cache.take_mutations();
        GatewaySnapshot::new(self.cache.export_entries(), self.cost.counters()).save(path)
    }

    /// Stop background tasks and write a final snapshot.
    pub fn shutdown(&self) -> Result<()> {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.flush()
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
