//! Local LLM RPC client
//!
//! Talks to an Ollama-compatible generation endpoint over HTTP. The
//! pipeline never requires a specific runtime: anything answering
//! `POST /api/generate` with `{"response": "..."}` works. All calls are
//! bounded by a per-call timeout; callers treat every failure here as
//! non-fatal and fall back to deterministic paths.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default generation endpoint host
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Errors from the local LLM endpoint
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM returned status {0}")]
    Status(u16),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("LLM response could not be parsed: {0}")]
    Parse(String),
}

/// Sampling options forwarded to the model
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl GenerateOptions {
    /// Low-temperature options for scalar scoring replies
    #[must_use]
    pub fn scoring() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.9,
            max_tokens: 50,
        }
    }

    /// Moderate-creativity options for titles and captions
    #[must_use]
    pub fn creative() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 100,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    #[serde(default)]
    name: String,
}

/// Client for a local Ollama-compatible endpoint
#[derive(Debug, Clone)]
pub struct LlmClient {
    host: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl LlmClient {
    /// Build a client with a fresh connection pool.
    ///
    /// The metadata retry loop relies on this constructor to get a fresh
    /// connection per attempt.
    pub fn new(host: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
            client,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one generation call and return the trimmed response text
    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, LlmError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options,
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "Calling LLM generate endpoint");

        let response = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status(status.as_u16()));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let text = body.response.trim().to_string();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        debug!(response_len = text.len(), "LLM generate call succeeded");
        Ok(text)
    }

    /// Probe the endpoint and warn if the configured model is not served.
    ///
    /// A failed probe is informational only; generation is attempted
    /// regardless, and its own failures drive the fallback paths.
    pub async fn verify_connection(&self) -> Result<(), LlmError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status(status.as_u16()));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        if !tags.models.iter().any(|m| m.name.contains(&self.model)) {
            warn!(
                model = %self.model,
                available = tags.models.len(),
                "Configured model not listed by the LLM endpoint"
            );
        }

        Ok(())
    }
}

/// Parse a scalar score out of free-form LLM text.
///
/// Accepts the first numeric substring: values in [0, 1] pass through,
/// values in (1, 10] are treated as a 0-10 scale and divided down,
/// anything else is unusable.
#[must_use]
pub fn parse_score(response: &str) -> Option<f64> {
    let mut number = String::new();
    let mut seen_digit = false;
    for ch in response.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
            seen_digit = true;
        } else if ch == '.' && seen_digit && !number.contains('.') {
            number.push(ch);
        } else if seen_digit {
            break;
        }
    }

    let score: f64 = number.trim_end_matches('.').parse().ok()?;
    if (0.0..=1.0).contains(&score) {
        Some(score)
    } else if score > 1.0 && score <= 10.0 {
        Some(score / 10.0)
    } else {
        warn!(score, "LLM score out of range");
        None
    }
}
