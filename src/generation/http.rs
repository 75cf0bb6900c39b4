//! HTTP generation client
//!
//! Talks to an Anthropic-style messages endpoint over reqwest and maps
//! transport/status failures into the typed [`GenerationError`] taxonomy.
//! Deliberately retry-free: the dispatcher decides what to do with each
//! error class.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{GenerationClient, GenerationError};
use crate::config::GeneratorConfig;

/// HTTP client for a hosted text-generation provider
pub struct HttpGenerationClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl HttpGenerationClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            GenerationError::Unavailable(format!("API key not found in env var {}", config.api_key_env))
        })?;

        // Connection-level timeout only; per-request timeouts come from
        // the caller so the dispatcher stays in control.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    fn build_request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        })
    }

    fn parse_retry_after(response: &reqwest::Response) -> Duration {
        response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60))
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError> {
        debug!(model = %self.model, prompt_len = prompt.len(), ?timeout, "generate: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(prompt);

        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    debug!("generate: request timed out");
                    GenerationError::Timeout(timeout)
                } else {
                    debug!(error = %e, "generate: transport error");
                    GenerationError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = Self::parse_retry_after(&response);
            debug!(?retry_after, "generate: rate limited (429)");
            return Err(GenerationError::RateLimited { retry_after });
        }

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(status, "generate: API error");
            return Err(GenerationError::Unavailable(format!("HTTP {}: {}", status, text)));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Unavailable(format!("malformed response body: {}", e)))?;

        let text = api_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ApiContentBlock::Text { text } => Some(text),
            })
            .collect::<Vec<_>>()
            .join("\n");

        debug!(response_len = text.len(), "generate: success");
        Ok(text)
    }
}

// Provider API response types

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ApiContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}
