//! Analysis provider client
//!
//! Narrow request/response seam to the external LLM API. The core treats
//! every provider failure as recoverable: expert workers degrade to fallback
//! results and the summary reducer falls back to a templated report, so
//! nothing here is allowed to abort a run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use threatscope_common::config::ProviderConfig;
use threatscope_common::{Error, Result};
use tracing::debug;

const USER_AGENT: &str = concat!("threatscope/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Provider call errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Malformed completion response: {0}")]
    Parse(String),

    #[error("Completion response contained no content")]
    EmptyResponse,
}

/// External analysis provider
///
/// One call per invocation: a system prompt plus user content in, the
/// assistant's text out. Implementations must be safe to share across the
/// concurrent expert tasks of a run.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn invoke(
        &self,
        system_prompt: &str,
        user_content: &str,
    ) -> std::result::Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiProvider {
    /// Build a client from resolved configuration.
    ///
    /// Fails fast when no API key is configured; everything after startup is
    /// recoverable per the error policy above.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("Provider API key not configured".to_string()))?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl AnalysisProvider for OpenAiProvider {
    async fn invoke(
        &self,
        system_prompt: &str,
        user_content: &str,
    ) -> std::result::Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
        };

        debug!(model = %self.model, "Invoking analysis provider");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status.as_u16(), body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

/// Fixed-response provider for tests and offline demos
pub struct StaticProvider {
    reply: String,
}

impl StaticProvider {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into() }
    }
}

#[async_trait]
impl AnalysisProvider for StaticProvider {
    async fn invoke(
        &self,
        _system_prompt: &str,
        _user_content: &str,
    ) -> std::result::Result<String, ProviderError> {
        Ok(self.reply.clone())
    }
}
