//! Generation backend client.
//!
//! Posts an ordered message list plus a system instruction to a
//! messages-style completion endpoint and returns a single text
//! completion. When no API key is configured the backend is considered
//! absent and a static fallback response is returned instead of failing.
//! Real backend failures are logged in full and surfaced as a generic
//! [`Error::Generation`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::models::ChatMessage;

/// Turns forwarded to the backend per call, regardless of transcript
/// length.
pub const TURN_WINDOW: usize = 3;

/// The most recent `window` messages, bounding prompt growth.
pub fn sliding_window(messages: &[ChatMessage], window: usize) -> &[ChatMessage] {
    let start = messages.len().saturating_sub(window);
    &messages[start..]
}

/// A synchronous text-generation service: ordered messages plus a system
/// instruction in, one text completion out.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [ChatMessage],
    system: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

pub struct HttpGenerator {
    client: Client,
    config: GenerationConfig,
    api_key: Option<String>,
}

impl HttpGenerator {
    /// Build a client from config, reading the API key from the
    /// environment variable the config names.
    pub fn new(config: GenerationConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "no generation API key configured; falling back to static responses"
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            api_key,
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
        let Some(ref api_key) = self.api_key else {
            return Ok(self.config.fallback_response.clone());
        };

        let request = MessageRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages,
            system,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "generation backend request failed");
                Error::Generation("AI service unavailable".to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body, "generation backend returned an error");
            return Err(Error::Generation("AI service unavailable".to_string()));
        }

        let message: MessageResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "generation backend response unreadable");
            Error::Generation("AI service unavailable".to_string())
        })?;

        let text = message
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(text.trim().to_string())
    }
}
