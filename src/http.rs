//! Shared HTTP plumbing for the provider clients.
//!
//! Every outbound JSON API (embeddings, completions, identity) goes through
//! a [`reqwest::Client`] built with [`build_client`]. Provider calls that may
//! be retried use [`send_with_retry`]:
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use crate::error::{ConfigError, EmbeddingError, GenerationError};

/// An error type tagged with the provider that produced it.
pub trait ProviderError {
    fn provider_error(provider: &str, message: String) -> Self;
}

impl ProviderError for EmbeddingError {
    fn provider_error(provider: &str, message: String) -> Self {
        EmbeddingError::new(provider, message)
    }
}

impl ProviderError for GenerationError {
    fn provider_error(provider: &str, message: String) -> Self {
        GenerationError::new(provider, message)
    }
}

/// A client whose requests give up after `timeout_secs`.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ConfigError::Missing(format!("usable HTTP client: {}", e)))
}

/// Send a JSON request and decode the JSON response, retrying rate limits,
/// server errors, and network failures with exponential backoff.
pub async fn send_with_retry<E: ProviderError>(
    provider: &str,
    request: reqwest::RequestBuilder,
    max_retries: u32,
) -> Result<serde_json::Value, E> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::warn!(provider, attempt, ?delay, "retrying provider request");
            tokio::time::sleep(delay).await;
        }

        let Some(request) = request.try_clone() else {
            return Err(E::provider_error(provider, "request body is not cloneable".into()));
        };

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| E::provider_error(provider, e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();
                let message = format!("API error {}: {}", status, body_text);
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(message);
                    continue;
                }
                return Err(E::provider_error(provider, message));
            }
            Err(e) => {
                last_err = Some(e.to_string());
            }
        }
    }

    let message = last_err.unwrap_or_else(|| "request failed after retries".to_string());
    Err(E::provider_error(provider, message))
}
