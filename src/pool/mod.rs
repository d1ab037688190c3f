//! Per-provider credential pool.
//!
//! Each configured API key is tracked independently through the state
//! machine `available → rate_limited → available` (short cooldown) and
//! `available → failed → available` (long cooldown). Recovery is lazy: a
//! cooling credential becomes eligible again the first time selection runs
//! after its cooldown elapsed. Selection itself is round-robin over the
//! available set.
//!
//! All state sits behind one coarse mutex, which is never held across an
//! await point.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Availability state of a single credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Available,
    RateLimited,
    Failed,
}

#[derive(Debug, Clone)]
struct Credential {
    id: String,
    api_key: String,
    status: CredentialStatus,
    cooldown_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
    usage_count: u64,
    success_count: u64,
    error_count: u64,
}

impl Credential {
    fn new(id: String, api_key: String) -> Self {
        Self {
            id,
            api_key,
            status: CredentialStatus::Available,
            cooldown_until: None,
            last_error: None,
            usage_count: 0,
            success_count: 0,
            error_count: 0,
        }
    }

    /// Lazily return to `Available` once the cooldown elapsed. `last_error`
    /// is kept until the next success for observability.
    fn recover_if_due(&mut self, now: DateTime<Utc>) {
        if self.status != CredentialStatus::Available
            && self.cooldown_until.is_some_and(|until| now >= until)
        {
            debug!(credential = %self.id, "Cooldown elapsed, credential available again");
            self.status = CredentialStatus::Available;
            self.cooldown_until = None;
        }
    }
}

/// Observable snapshot of one credential. The secret is never exposed here.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStats {
    pub id: String,
    pub status: CredentialStatus,
    pub cooldown_remaining_ms: u64,
    pub usage_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
}

/// A selected credential handed to the HTTP client for one attempt.
#[derive(Debug, Clone)]
pub struct CredentialLease {
    pub id: String,
    pub api_key: String,
}

#[derive(Debug)]
struct PoolState {
    credentials: Vec<Credential>,
    /// Round-robin cursor: index of the next credential to consider.
    cursor: usize,
}

/// Pool of credentials for one provider.
pub struct CredentialPool {
    provider: String,
    rotation_cooldown: Duration,
    fail_retry_delay: Duration,
    state: Mutex<PoolState>,
}

impl CredentialPool {
    pub fn new(
        provider: &str,
        api_keys: &[String],
        rotation_cooldown_ms: u64,
        fail_retry_delay_ms: u64,
    ) -> Self {
        let credentials = api_keys
            .iter()
            .enumerate()
            .map(|(i, key)| Credential::new(format!("{provider}-key-{}", i + 1), key.clone()))
            .collect::<Vec<_>>();
        info!(
            provider,
            credentials = credentials.len(),
            "Initialized credential pool"
        );
        Self {
            provider: provider.to_string(),
            rotation_cooldown: Duration::milliseconds(rotation_cooldown_ms as i64),
            fail_retry_delay: Duration::milliseconds(fail_retry_delay_ms as i64),
            state: Mutex::new(PoolState {
                credentials,
                cursor: 0,
            }),
        }
    }

    /// Recover any credential whose cooldown elapsed, then pick the next
    /// available one in round-robin order. Returns `None` when the available
    /// set is empty.
    pub fn get_next_available(&self) -> Option<CredentialLease> {
        let mut state = self.state.lock();
        let now = Utc::now();
        for credential in state.credentials.iter_mut() {
            credential.recover_if_due(now);
        }

        let len = state.credentials.len();
        if len == 0 {
            return None;
        }
        for offset in 0..len {
            let idx = (state.cursor + offset) % len;
            if state.credentials[idx].status == CredentialStatus::Available {
                state.cursor = (idx + 1) % len;
                let credential = &mut state.credentials[idx];
                credential.usage_count += 1;
                return Some(CredentialLease {
                    id: credential.id.clone(),
                    api_key: credential.api_key.clone(),
                });
            }
        }
        None
    }

    /// Short cooldown after an HTTP 429.
    pub fn mark_rate_limited(&self, id: &str, reason: &str) {
        self.transition(id, CredentialStatus::RateLimited, self.rotation_cooldown, reason);
    }

    /// Long cooldown after an auth or unclassified failure.
    pub fn mark_failed(&self, id: &str, reason: &str) {
        self.transition(id, CredentialStatus::Failed, self.fail_retry_delay, reason);
    }

    fn transition(&self, id: &str, status: CredentialStatus, cooldown: Duration, reason: &str) {
        let mut state = self.state.lock();
        let Some(credential) = state.credentials.iter_mut().find(|c| c.id == id) else {
            return;
        };
        credential.status = status;
        credential.cooldown_until = Some(Utc::now() + cooldown);
        credential.last_error = Some(reason.to_string());
        credential.error_count += 1;
        warn!(
            provider = %self.provider,
            credential = id,
            ?status,
            cooldown_ms = cooldown.num_milliseconds(),
            reason,
            "Credential placed in cooldown"
        );
    }

    /// A success returns the credential to `Available` regardless of prior
    /// state and clears the recorded error and cooldown.
    pub fn mark_success(&self, id: &str) {
        let mut state = self.state.lock();
        if let Some(credential) = state.credentials.iter_mut().find(|c| c.id == id) {
            credential.status = CredentialStatus::Available;
            credential.cooldown_until = None;
            credential.last_error = None;
            credential.success_count += 1;
        }
    }

    /// Administrative escape hatch: force every credential back to
    /// `Available` immediately.
    pub fn reset_all(&self) {
        let mut state = self.state.lock();
        for credential in state.credentials.iter_mut() {
            credential.status = CredentialStatus::Available;
            credential.cooldown_until = None;
        }
        info!(provider = %self.provider, "All credentials reset to available");
    }

    /// Number of credentials currently selectable (after lazy recovery).
    pub fn available_count(&self) -> usize {
        let mut state = self.state.lock();
        let now = Utc::now();
        for credential in state.credentials.iter_mut() {
            credential.recover_if_due(now);
        }
        state
            .credentials
            .iter()
            .filter(|c| c.status == CredentialStatus::Available)
            .count()
    }

    pub fn len(&self) -> usize {
        self.state.lock().credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> Vec<CredentialStats> {
        let state = self.state.lock();
        let now = Utc::now();
        state
            .credentials
            .iter()
            .map(|c| CredentialStats {
                id: c.id.clone(),
                status: c.status,
                cooldown_remaining_ms: c
                    .cooldown_until
                    .map(|until| (until - now).num_milliseconds().max(0) as u64)
                    .unwrap_or(0),
                usage_count: c.usage_count,
                success_count: c.success_count,
                error_count: c.error_count,
                last_error: c.last_error.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("sk-{i}")).collect()
    }

    #[test]
    fn test_round_robin_fairness() {
        let pool = CredentialPool::new("p1", &keys(3), 60_000, 300_000);
        let mut picks: HashMap<String, usize> = HashMap::new();
        for _ in 0..30 {
            let lease = pool.get_next_available().unwrap();
            *picks.entry(lease.id).or_default() += 1;
        }
        assert_eq!(picks.len(), 3);
        for count in picks.values() {
            assert_eq!(*count, 10);
        }
    }

    #[test]
    fn test_rate_limited_credential_is_skipped() {
        let pool = CredentialPool::new("p1", &keys(2), 60_000, 300_000);
        let first = pool.get_next_available().unwrap();
        pool.mark_rate_limited(&first.id, "429");

        for _ in 0..4 {
            let lease = pool.get_next_available().unwrap();
            assert_ne!(lease.id, first.id);
        }
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn test_cooldown_recovery() {
        let pool = CredentialPool::new("p1", &keys(1), 40, 300_000);
        let lease = pool.get_next_available().unwrap();
        pool.mark_rate_limited(&lease.id, "429");

        assert!(pool.get_next_available().is_none());

        std::thread::sleep(std::time::Duration::from_millis(60));
        let recovered = pool.get_next_available().unwrap();
        assert_eq!(recovered.id, lease.id);
    }

    #[test]
    fn test_failed_uses_longer_cooldown() {
        let pool = CredentialPool::new("p1", &keys(2), 30, 10_000);
        let a = pool.get_next_available().unwrap();
        let b = pool.get_next_available().unwrap();
        pool.mark_rate_limited(&a.id, "429");
        pool.mark_failed(&b.id, "401");

        std::thread::sleep(std::time::Duration::from_millis(50));
        // Only the rate-limited credential recovered; the failed one is
        // still inside its longer cooldown.
        assert_eq!(pool.available_count(), 1);
        assert_eq!(pool.get_next_available().unwrap().id, a.id);
    }

    #[test]
    fn test_success_returns_to_available_from_any_state() {
        let pool = CredentialPool::new("p1", &keys(1), 60_000, 300_000);
        let lease = pool.get_next_available().unwrap();
        pool.mark_failed(&lease.id, "boom");
        assert!(pool.get_next_available().is_none());

        pool.mark_success(&lease.id);
        assert!(pool.get_next_available().is_some());

        let stats = pool.stats();
        assert_eq!(stats[0].success_count, 1);
        assert_eq!(stats[0].error_count, 1);
        assert!(stats[0].last_error.is_none());
    }

    #[test]
    fn test_reset_all() {
        let pool = CredentialPool::new("p1", &keys(3), 60_000, 300_000);
        for lease in pool.stats() {
            pool.mark_failed(&lease.id, "auth");
        }
        assert!(pool.get_next_available().is_none());

        pool.reset_all();
        assert_eq!(pool.available_count(), 3);
    }

    #[test]
    fn test_stats_reflect_cooldown() {
        let pool = CredentialPool::new("p1", &keys(1), 60_000, 300_000);
        let lease = pool.get_next_available().unwrap();
        pool.mark_rate_limited(&lease.id, "too many requests");

        let stats = pool.stats();
        assert_eq!(stats[0].status, CredentialStatus::RateLimited);
        assert!(stats[0].cooldown_remaining_ms > 50_000);
        assert_eq!(stats[0].last_error.as_deref(), Some("too many requests"));
    }

    #[test]
    fn test_empty_pool() {
        let pool = CredentialPool::new("p1", &[], 60_000, 300_000);
        assert!(pool.get_next_available().is_none());
        assert!(pool.is_empty());
    }
}
