use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failure talking to the completion provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,
    #[error("provider is throttling requests")]
    Throttled,
    #[error("provider error: HTTP {status}")]
    Server { status: u16 },
    #[error("request rejected: HTTP {status}")]
    Client { status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response body: {0}")]
    InvalidBody(String),
}

impl ProviderError {
    /// Timeouts, throttling, 5xx and connection problems are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout
                | ProviderError::Throttled
                | ProviderError::Server { .. }
                | ProviderError::Transport(_)
        )
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ProviderError::Throttled,
            408 => ProviderError::Timeout,
            500..=599 => ProviderError::Server { status },
            _ => ProviderError::Client { status },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if let Some(status) = e.status() {
            ProviderError::from_status(status.as_u16())
        } else if e.is_decode() {
            ProviderError::InvalidBody(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// A text-completion endpoint. Returns the raw completion text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError>;

    /// Short label for logs.
    fn model(&self) -> &str;
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str, // "json" for structured output
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String, timeout: Duration, temperature: f32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature,
            client,
        })
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
            format: "json", // Force JSON output
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16()));
        }

        // Body read errors, including the client deadline, classify like send errors
        let body = response.bytes().await?;

        decode_response(&body)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn decode_response(body: &[u8]) -> Result<String, ProviderError> {
    let ollama_response: OllamaResponse =
        serde_json::from_slice(body).map_err(|e| ProviderError::InvalidBody(e.to_string()))?;
    Ok(ollama_response.response)
}
