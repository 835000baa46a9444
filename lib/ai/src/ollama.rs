//! Ollama generation backend.

use crate::backend::TextGenerator;
use crate::error::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Configuration for an Ollama backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

impl OllamaConfig {
    /// Creates a new configuration.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Text generator backed by a local Ollama instance.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaGenerator {
    /// Creates a new generator.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: OllamaConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::ProviderUnavailable {
                provider: "ollama".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        debug!(model = %self.config.model, prompt_len = prompt.len(), "ollama generate");

        let response = self
            .client
            .post(self.config.endpoint())
            .json(&GenerateRequest {
                model: &self.config.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::RequestFailed {
                reason: format!("ollama returned {status}"),
            });
        }

        let body: GenerateResponse =
            response
                .json()
                .await
                .map_err(|e| GenerationError::ResponseParseFailed {
                    reason: e.to_string(),
                })?;

        Ok(body.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
