//! Shared request, response and status types.

use serde::{Deserialize, Serialize};

use crate::cost::AnalyticsReport;
use crate::pool::CredentialStats;

/// Sampling parameters forwarded to the provider and folded into cache keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl SamplingParams {
    /// Stable textual form used inside cache keys. Two parameter sets hash
    /// identically iff they are equal.
    pub fn fingerprint(&self) -> String {
        format!(
            "t={:?};p={:?};n={:?}",
            self.temperature, self.top_p, self.max_tokens
        )
    }
}

/// Token accounting for a single completion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Rough estimate from character counts, for providers that omit usage
    /// and for the local fallback. Four characters per token.
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        let prompt_tokens = (prompt.len() / 4) as u32;
        let completion_tokens = (completion.len() / 4) as u32;
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Per-call options for [`Gateway::generate`](crate::Gateway::generate).
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Preferred model. When unset the dispatcher uses the first model of
    /// the first enabled provider.
    pub model: Option<String>,
    pub params: SamplingParams,
    /// Topic fed to the deterministic local fallback. Defaults to a prefix
    /// of the prompt.
    pub topic: Option<String>,
    /// Strategy label echoed by the local fallback.
    pub strategy: Option<String>,
    /// Iteration counter echoed by the local fallback.
    pub iteration: u32,
    /// Bypass the response cache for this call (lookup and insert).
    pub skip_cache: bool,
    /// Override the cache TTL for this response, in milliseconds.
    pub ttl_override_ms: Option<u64>,
}

/// Result of a `generate` call. This is the entire surface callers consume.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub content: String,
    /// Provider that served the request, or `"local"` for the fallback.
    pub provider: String,
    pub model: String,
    pub usage: Usage,
    pub cached: bool,
}

/// Snapshot of the gateway's routing and credential state.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    /// Provider of the most recent successful remote completion.
    pub current_provider: Option<String>,
    /// Model of the most recent successful remote completion.
    pub current_model: Option<String>,
    pub providers: Vec<ProviderStatus>,
    pub analytics: AnalyticsReport,
}

/// Per-provider slice of [`GatewayStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub id: String,
    pub enabled: bool,
    /// Models excluded for the rest of the session.
    pub failed_models: Vec<String>,
    pub credentials: Vec<CredentialStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        let params = SamplingParams {
            temperature: Some(0.7),
            top_p: None,
            max_tokens: Some(256),
        };
        assert_eq!(params.fingerprint(), params.clone().fingerprint());
        assert_ne!(params.fingerprint(), SamplingParams::default().fingerprint());
    }

    #[test]
    fn test_usage_estimate() {
        let usage = Usage::estimate("abcdefgh", "abcd");
        assert_eq!(usage.prompt_tokens, 2);
        assert_eq!(usage.completion_tokens, 1);
        assert_eq!(usage.total_tokens, 3);
    }
}
