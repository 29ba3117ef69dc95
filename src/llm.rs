//! Text-completion clients.
//!
//! The orchestrator only needs one operation: send a fully rendered prompt,
//! get text back. [`ChatModel`] is that seam.
//!
//! - **[`AnthropicModel`]**: `POST /v1/messages` on the Anthropic API.
//!   Requires `ANTHROPIC_API_KEY`.
//! - **[`OllamaChatModel`]**: `POST /api/generate` on a local Ollama.
//!
//! Both retry 429 and 5xx responses with exponential backoff up to
//! `llm.max_retries` times. Other failures surface as [`GenerationError`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::{ConfigError, GenerationError};
use crate::http::{build_client, send_with_retry};

const ANTHROPIC_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A language model that completes a single prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

pub struct AnthropicModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

impl AnthropicModel {
    pub fn new(config: &LlmConfig) -> Result<Self, ConfigError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ConfigError::Missing("ANTHROPIC_API_KEY".to_string()))?;

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_URL.to_string()),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChatModel for AnthropicModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let json = send_with_retry::<GenerationError>("anthropic", request, self.max_retries).await?;
        parse_anthropic_response(json)
    }
}

/// Concatenates the `text` blocks of a messages response.
fn parse_anthropic_response(json: serde_json::Value) -> Result<String, GenerationError> {
    let response: AnthropicResponse = serde_json::from_value(json)
        .map_err(|e| GenerationError::new("anthropic", format!("invalid response: {}", e)))?;

    let text: String = response
        .content
        .into_iter()
        .filter(|c| c.content_type == "text")
        .filter_map(|c| c.text)
        .collect();

    if text.is_empty() {
        return Err(GenerationError::new("anthropic", "response contained no text"));
    }
    Ok(text)
}

/// Completion via a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaChatModel {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl OllamaChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let request = self
            .client
            .post(format!("{}/api/generate", self.url.trim_end_matches('/')))
            .json(&body);

        let json = send_with_retry::<GenerationError>("ollama", request, self.max_retries).await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| GenerationError::new("ollama", "invalid response: missing response field"))
    }
}

/// Create the configured [`ChatModel`].
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>, ConfigError> {
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicModel::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChatModel::new(config)?)),
        other => Err(ConfigError::Missing(format!(
            "known llm provider (got '{}')",
            other
        ))),
    }
}
