//! Failover dispatcher.
//!
//! `generate` is the single entry point every caller goes through. It
//! consults the cache, then walks {provider → model → credential}
//! combinations, classifying each failure and updating credential and model
//! state, and finally answers from the deterministic local fallback when
//! everything is exhausted. It never returns an error.

mod client;
mod fallback;

pub use client::{CompletionBackend, ProviderClient, RemoteCompletion};
pub use fallback::{local_fallback, topic_from_prompt};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CachedResponse, Complexity, ResponseCache};
use crate::config::GatewayConfig;
use crate::cost::CostEstimator;
use crate::error::FailureClass;
use crate::pool::CredentialPool;
use crate::registry::{Provider, ProviderRegistry};
use crate::types::{GenerateOptions, GenerateResponse, GatewayStatus, ProviderStatus, Usage};

/// Provider and model identifiers reported for local fallback responses.
pub const FALLBACK_PROVIDER: &str = "local";
pub const FALLBACK_MODEL: &str = "deterministic-fallback";

pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    pools: HashMap<String, Arc<CredentialPool>>,
    cache: Arc<ResponseCache>,
    cost: Arc<CostEstimator>,
    backend: Arc<dyn CompletionBackend>,
    /// Models excluded for the rest of the session, keyed (provider, model).
    failed_models: Mutex<HashSet<(String, String)>>,
    /// Provider/model of the most recent successful remote completion.
    last_route: Mutex<Option<(String, String)>>,
    max_attempts: u32,
    overall_deadline: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        pools: HashMap<String, Arc<CredentialPool>>,
        cache: Arc<ResponseCache>,
        cost: Arc<CostEstimator>,
        backend: Arc<dyn CompletionBackend>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            registry,
            pools,
            cache,
            cost,
            backend,
            failed_models: Mutex::new(HashSet::new()),
            last_route: Mutex::new(None),
            max_attempts: config.max_attempts,
            overall_deadline: Duration::from_millis(config.overall_deadline_ms),
        }
    }

    /// Route one prompt. Tries the cache, then remote combinations, then the
    /// local fallback. Infallible by construction.
    pub async fn generate(&self, prompt: &str, options: &GenerateOptions) -> GenerateResponse {
        let started = Instant::now();
        let keyed_model = self.keyed_model(options);

        if !options.skip_cache {
            if let Some(hit) = self.cache.get(prompt, &keyed_model, &options.params) {
                self.cost.track_request(
                    true,
                    &keyed_model,
                    started.elapsed().as_secs_f64() * 1000.0,
                );
                debug!(model = %keyed_model, "Serving response from cache");
                return GenerateResponse {
                    content: hit.content,
                    provider: hit.provider,
                    model: hit.model,
                    usage: hit.usage,
                    cached: true,
                };
            }
        }

        for provider in self.registry.iter_enabled() {
            if started.elapsed() >= self.overall_deadline {
                warn!("Overall deadline reached, skipping remaining providers");
                break;
            }
            if let Some(response) = self
                .try_provider(provider, prompt, options, &keyed_model, started)
                .await
            {
                return response;
            }
        }

        let topic = options
            .topic
            .clone()
            .unwrap_or_else(|| topic_from_prompt(prompt));
        info!(%topic, iteration = options.iteration, "All combinations exhausted, using local fallback");
        let content = local_fallback(&topic, options.strategy.as_deref(), options.iteration);
        let usage = Usage::estimate(prompt, &content);
        GenerateResponse {
            content,
            provider: FALLBACK_PROVIDER.to_string(),
            model: FALLBACK_MODEL.to_string(),
            usage,
            cached: false,
        }
    }

    /// Attempt one provider within its attempt budget. `Some` means success;
    /// `None` means the provider is exhausted and the next should be tried.
    async fn try_provider(
        &self,
        provider: &Provider,
        prompt: &str,
        options: &GenerateOptions,
        keyed_model: &str,
        started: Instant,
    ) -> Option<GenerateResponse> {
        let pool = self.pools.get(&provider.id)?;

        for attempt in 1..=self.max_attempts {
            if started.elapsed() >= self.overall_deadline {
                return None;
            }
            let Some(model) = self.next_model(provider, options.model.as_deref()) else {
                debug!(provider = %provider.id, "No eligible model left");
                return None;
            };
            let Some(credential) = pool.get_next_available() else {
                debug!(provider = %provider.id, "No available credential");
                return None;
            };

            let attempt_start = Instant::now();
            match self
                .backend
                .complete(provider, &model, &credential, prompt, &options.params)
                .await
            {
                Ok(remote) => {
                    pool.mark_success(&credential.id);
                    let latency_ms = attempt_start.elapsed().as_secs_f64() * 1000.0;
                    self.cost.track_request(false, &model, latency_ms);
                    *self.last_route.lock() = Some((provider.id.clone(), model.clone()));
                    info!(
                        provider = %provider.id,
                        %model,
                        attempt,
                        latency_ms = latency_ms as u64,
                        "Completion succeeded"
                    );

                    if !options.skip_cache
                        && self.cache.should_cache(
                            self.cost.per_model_cost(&model),
                            remote.content.len(),
                            complexity_of(prompt, options),
                        )
                    {
                        self.cache.set(
                            prompt,
                            keyed_model,
                            &options.params,
                            CachedResponse {
                                content: remote.content.clone(),
                                provider: provider.id.clone(),
                                model: model.clone(),
                                usage: remote.usage.clone(),
                            },
                            options.ttl_override_ms,
                        );
                    }

                    return Some(GenerateResponse {
                        content: remote.content,
                        provider: provider.id.clone(),
                        model,
                        usage: remote.usage,
                        cached: false,
                    });
                }
                Err(err) => {
                    let class = err.classify();
                    warn!(
                        provider = %provider.id,
                        %model,
                        credential = %credential.id,
                        attempt,
                        ?class,
                        error = %err,
                        "Completion attempt failed"
                    );
                    match class {
                        FailureClass::RateLimited => {
                            pool.mark_rate_limited(&credential.id, &err.to_string());
                            self.fail_model(&provider.id, &model);
                        }
                        FailureClass::Unauthorized => {
                            // Model stays eligible; retry with a different
                            // credential.
                            pool.mark_failed(&credential.id, &err.to_string());
                        }
                        FailureClass::ModelUnavailable => {
                            self.fail_model(&provider.id, &model);
                        }
                        FailureClass::TransientNetwork | FailureClass::Unknown => {
                            pool.mark_failed(&credential.id, &err.to_string());
                            self.fail_model(&provider.id, &model);
                        }
                    }
                }
            }
        }
        debug!(provider = %provider.id, "Attempt budget exhausted");
        None
    }

    /// Model identity used for cache keying: the caller's preference, else
    /// the primary model of the first enabled provider.
    fn keyed_model(&self, options: &GenerateOptions) -> String {
        options
            .model
            .clone()
            .or_else(|| {
                self.registry
                    .iter_enabled()
                    .next()
                    .and_then(|p| p.models.first().cloned())
            })
            .unwrap_or_else(|| FALLBACK_MODEL.to_string())
    }

    /// Next eligible model for a provider: the preferred model when it is in
    /// this provider's list and not session-failed, else the first eligible
    /// model in declaration order.
    fn next_model(&self, provider: &Provider, preferred: Option<&str>) -> Option<String> {
        let failed = self.failed_models.lock();
        if let Some(model) = preferred {
            if provider.has_model(model)
                && !failed.contains(&(provider.id.clone(), model.to_string()))
            {
                return Some(model.to_string());
            }
        }
        provider
            .models
            .iter()
            .find(|m| !failed.contains(&(provider.id.clone(), (*m).clone())))
            .cloned()
    }

    fn fail_model(&self, provider_id: &str, model: &str) {
        let mut failed = self.failed_models.lock();
        if failed.insert((provider_id.to_string(), model.to_string())) {
            warn!(provider = provider_id, model, "Model excluded for this session");
        }
    }

    /// Clear the session-scoped failed-models set.
    pub fn reset_failed_models(&self) {
        let mut failed = self.failed_models.lock();
        if !failed.is_empty() {
            info!(count = failed.len(), "Clearing session-failed models");
            failed.clear();
        }
    }

    /// Force every credential in every pool back to available.
    pub fn reset_failed_credentials(&self) {
        for pool in self.pools.values() {
            pool.reset_all();
        }
    }

    pub fn get_status(&self) -> GatewayStatus {
        let failed = self.failed_models.lock().clone();
        let last = self.last_route.lock().clone();
        let providers = self
            .registry
            .iter()
            .map(|p| ProviderStatus {
                id: p.id.clone(),
                enabled: p.enabled,
                failed_models: p
                    .models
                    .iter()
                    .filter(|m| failed.contains(&(p.id.clone(), (*m).clone())))
                    .cloned()
                    .collect(),
                credentials: self
                    .pools
                    .get(&p.id)
                    .map(|pool| pool.stats())
                    .unwrap_or_default(),
            })
            .collect();
        GatewayStatus {
            current_provider: last.as_ref().map(|(p, _)| p.clone()),
            current_model: last.map(|(_, m)| m),
            providers,
            analytics: self.cost.report(self.cache.len()),
        }
    }

    /// Periodic self-healing: clears session-failed models and recovers all
    /// credential pools so previously failing providers are retried. Never
    /// awaited by the request path.
    pub fn start_maintenance_task(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                debug!("Maintenance: resetting failed models and credential pools");
                self.reset_failed_models();
                self.reset_failed_credentials();
            }
        })
    }
}

/// Coarse complexity heuristic for the caching policy: long prompts and
/// large completion budgets are the expensive requests worth keeping.
fn complexity_of(prompt: &str, options: &GenerateOptions) -> Complexity {
    let budget = options.params.max_tokens.unwrap_or(0);
    if prompt.len() > 400 || budget > 1000 {
        Complexity::High
    } else if prompt.len() > 150 || budget > 300 {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}
