//! Language-model provider abstraction.
//!
//! One [`ChatModel`] trait serves both pipeline call sites — query
//! rephrasing and answer generation — which differ only in the messages
//! they supply. The concrete [`GroqChat`] implementation speaks the
//! OpenAI-compatible chat-completions API, with the same retry/backoff
//! policy as the embedding provider.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// One message in a completion request.
#[derive(Debug, Clone, Serialize)]
pub struct LlmMessage {
    /// `"system"`, `"user"`, or `"assistant"`.
    pub role: &'static str,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// Trait for chat-completion providers.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"llama-3.3-70b-versatile"`).
    fn model_name(&self) -> &str;

    /// Run a non-streaming completion over the given messages.
    async fn complete(&self, messages: &[LlmMessage]) -> Result<String>;
}

/// A no-op model that always returns errors.
///
/// Used when `llm.provider = "disabled"` in the configuration.
pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _messages: &[LlmMessage]) -> Result<String> {
        Err(Error::LlmProvider("llm provider is disabled".to_string()))
    }
}

/// Chat provider backed by the Groq API (OpenAI-compatible).
///
/// Requires the `GROQ_API_KEY` environment variable.
pub struct GroqChat {
    model: String,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
    url: String,
}

impl GroqChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| Error::Config("GROQ_API_KEY environment variable not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::LlmProvider(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            max_retries: config.max_retries,
            api_key,
            client,
            url: GROQ_CHAT_URL.to_string(),
        })
    }
}

#[async_trait]
impl ChatModel for GroqChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[LlmMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| Error::LlmProvider(e.to_string()))?;
                        return parse_completion(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::LlmProvider(format!(
                            "Groq API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::LlmProvider(format!(
                        "Groq API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(Error::LlmProvider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::LlmProvider("completion failed after retries".into())))
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::LlmProvider("invalid completion response: missing content".into()))
}

/// Create the appropriate [`ChatModel`] based on configuration.
pub fn create_chat_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledChatModel)),
        "groq" => Ok(Box::new(GroqChat::new(config)?)),
        other => Err(Error::Config(format!("unknown llm provider: {}", other))),
    }
}
