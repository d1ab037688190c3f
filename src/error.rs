//! Error types for the gateway.
//!
//! `GatewayError` covers construction-time and persistence failures that the
//! caller can see. Remote completion failures are a separate `ProviderError`
//! that never escapes the dispatcher: every attempt error is classified into
//! a `FailureClass` and recovered by advancing the provider/model/credential
//! selection.

use thiserror::Error;

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot load/save errors
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// Error produced by a single remote completion attempt.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The provider answered with a non-success HTTP status.
    #[error("{provider} returned HTTP {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    /// The request never produced an HTTP response.
    #[error("network error talking to {provider}: {message}")]
    Network { provider: String, message: String },

    /// The per-attempt timeout elapsed.
    #[error("request to {provider} timed out")]
    Timeout { provider: String },

    /// The provider answered 2xx but the body was not a completion.
    #[error("{provider} returned an unreadable response: {message}")]
    Decode { provider: String, message: String },
}

impl ProviderError {
    pub fn api(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn timeout(provider: impl Into<String>) -> Self {
        Self::Timeout {
            provider: provider.into(),
        }
    }

    pub fn decode(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn rate_limit(provider: impl Into<String>) -> Self {
        Self::api(provider, 429, "rate limit exceeded")
    }

    pub fn authentication(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::api(provider, 401, message)
    }

    pub fn model_not_found(provider: impl Into<String>, model: &str) -> Self {
        Self::api(provider, 404, format!("model {model} not found"))
    }

    /// HTTP status of the attempt, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify the failure for the dispatcher's recovery policy.
    ///
    /// Status codes win; rate-limit and missing-model phrasing in the body is
    /// recognized as well because several providers report those conditions
    /// with generic statuses.
    pub fn classify(&self) -> FailureClass {
        match self {
            Self::Api {
                status, message, ..
            } => {
                let text = message.to_lowercase();
                match *status {
                    429 => FailureClass::RateLimited,
                    401 | 403 => FailureClass::Unauthorized,
                    404 => FailureClass::ModelUnavailable,
                    _ if text.contains("rate limit") || text.contains("too many requests") => {
                        FailureClass::RateLimited
                    }
                    _ if text.contains("model not found") || text.contains("does not exist") => {
                        FailureClass::ModelUnavailable
                    }
                    _ => FailureClass::Unknown,
                }
            }
            Self::Network { .. } | Self::Timeout { .. } => FailureClass::TransientNetwork,
            Self::Decode { .. } => FailureClass::Unknown,
        }
    }
}

/// Failure taxonomy driving the failover policy.
///
/// All of these are recovered locally by moving to the next
/// provider/model/credential combination; none propagate to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Short recoverable cooldown for the credential; the model is skipped
    /// for the rest of the session.
    RateLimited,
    /// Long recoverable cooldown for the credential; the model stays
    /// eligible under a different credential.
    Unauthorized,
    /// Model-scoped failure; the credential is untouched.
    ModelUnavailable,
    /// Retryable with a different combination.
    TransientNetwork,
    /// Conservatively treated as both credential- and model-failing.
    Unknown,
}
