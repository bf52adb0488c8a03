//! Extraction model transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::net::{FetchError, HttpSettings, build_http_client, default_api_user_agent};

use super::ModelError;

/// Default local model server.
pub const DEFAULT_MODEL_URL: &str = "http://localhost:11434";

/// Default model name.
pub const DEFAULT_MODEL: &str = "gpt-oss:20b";

const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 300;

/// Single-turn text generation.
///
/// Uses `async_trait` so the extractor can hold an `Arc<dyn LlmClient>`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends `prompt` and returns the raw reply text.
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Client for an Ollama-compatible `/api/generate` endpoint.
#[derive(Debug)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: Client,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    /// Creates a client with the default generation timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if HTTP client construction fails.
    pub fn new(base_url: &str, model: &str) -> Result<Self, FetchError> {
        Self::with_timeout(base_url, model, Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS))
    }

    /// Creates a client with a custom generation timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if HTTP client construction fails.
    pub fn with_timeout(base_url: &str, model: &str, timeout: Duration) -> Result<Self, FetchError> {
        let settings = HttpSettings::with_request_timeout(timeout);
        let client = build_http_client("model", &default_api_user_agent(), &settings)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "Calling model");

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_connect() {
                ModelError::Connection {
                    base_url: self.base_url.clone(),
                }
            } else if e.is_timeout() {
                ModelError::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                ModelError::Request {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| ModelError::Decode {
            reason: e.to_string(),
        })?;
        Ok(parsed.response)
    }
}
