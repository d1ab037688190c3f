//! Remote completion client.
//!
//! Every provider is spoken to through an OpenAI-style chat-completions
//! POST; the auth scheme decides where the credential goes. Non-success
//! statuses and transport failures become [`ProviderError`]s for the
//! dispatcher to classify.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthScheme;
use crate::error::{ProviderError, Result};
use crate::pool::CredentialLease;
use crate::registry::Provider;
use crate::types::{SamplingParams, Usage};

/// A successful remote completion.
#[derive(Debug, Clone)]
pub struct RemoteCompletion {
    pub content: String,
    pub usage: Usage,
}

/// Seam between the dispatcher and the network, so failover policy can be
/// tested without HTTP.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        provider: &Provider,
        model: &str,
        credential: &CredentialLease,
        prompt: &str,
        params: &SamplingParams,
    ) -> std::result::Result<RemoteCompletion, ProviderError>;
}

/// HTTP backend over a shared reqwest client with a per-attempt timeout.
pub struct ProviderClient {
    http: reqwest::Client,
}

impl ProviderClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageWire>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageWire,
}

#[derive(Deserialize)]
struct MessageWire {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct UsageWire {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[async_trait]
impl CompletionBackend for ProviderClient {
    async fn complete(
        &self,
        provider: &Provider,
        model: &str,
        credential: &CredentialLease,
        prompt: &str,
        params: &SamplingParams,
    ) -> std::result::Result<RemoteCompletion, ProviderError> {
        let url = format!("{}/chat/completions", provider.base_url);
        let body = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
        };

        let mut request = self.http.post(&url).json(&body);
        request = match provider.auth_scheme {
            AuthScheme::Bearer => request.bearer_auth(&credential.api_key),
            AuthScheme::ApiKeyHeader => request.header("x-api-key", &credential.api_key),
        };

        debug!(provider = %provider.id, model, credential = %credential.id, "Dispatching completion request");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::timeout(&provider.id)
            } else {
                ProviderError::network(&provider.id, e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::network(&provider.id, e.to_string()))?;
        if !status.is_success() {
            let mut message = text;
            message.truncate(300);
            return Err(ProviderError::api(&provider.id, status.as_u16(), message));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::decode(&provider.id, e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::decode(&provider.id, "response has no choices"))?;

        let usage = match parsed.usage {
            Some(u) => Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            },
            None => Usage::estimate(prompt, &content),
        };

        Ok(RemoteCompletion { content, usage })
    }
}
