//! Gemini `generateContent` REST backend
//!
//! [`GeminiBackend`] is stateless: every prompt is sent on its own.
//! [`GeminiChatBackend`] keeps the conversation so far and sends it along
//! with each new prompt.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{Backend, BackendOutcome};
use crate::{Error, Result};

/// Gemini v1beta REST API base
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Header carrying the API key, keeping it out of request URLs
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Most turns (user and model) a conversation keeps before dropping the oldest
const MAX_CHAT_TURNS: usize = 40;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(ToString::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: &'a [Content],
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Stateless Gemini backend for one model
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    name: String,
}

impl GeminiBackend {
    /// Create a backend for `model`
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty or the HTTP client cannot be built
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Gemini API key required".to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            name: format!("gemini/{model}"),
            model,
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Point the backend at a different API base (proxies, tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Model identifier
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Send `contents` and fold the result into an outcome
    async fn generate(&self, contents: &[Content]) -> BackendOutcome {
        tracing::debug!(model = %self.model, turns = contents.len(), "calling Gemini");

        let response = match self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&GenerateRequest { contents })
            .send()
            .await
        {
            Ok(response) => response,
            // Outcome details are logged, so the URL is dropped from them
            Err(e) if e.is_timeout() => {
                return BackendOutcome::Failure(format!("request timed out: {}", e.without_url()));
            }
            Err(e) => {
                return BackendOutcome::from_error(
                    None,
                    format!("request failed: {}", e.without_url()),
                );
            }
        };

        let status = response.status();
        tracing::debug!(model = %self.model, status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return BackendOutcome::from_error(
                Some(status.as_u16()),
                format!("Gemini API error {status}: {body}"),
            );
        }

        let parsed: GenerateResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => return BackendOutcome::Failure(format!("malformed response: {e}")),
        };

        match extract_text(&parsed) {
            Some(text) => BackendOutcome::Success(text),
            None => BackendOutcome::Failure("response contained no text".to_string()),
        }
    }
}

/// Text of the first part of the first candidate, if present and not blank
fn extract_text(response: &GenerateResponse) -> Option<String> {
    response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .first()?
        .text
        .clone()
        .filter(|t| !t.trim().is_empty())
}

#[async_trait]
impl Backend for GeminiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: &str) -> BackendOutcome {
        self.generate(&[Content::text(None, prompt)]).await
    }
}

/// Gemini backend that remembers earlier turns of the conversation
///
/// One conversation is shared by every caller of the backend. Prompts are
/// serialized so turns are recorded in order; a turn is only kept when the
/// model replied.
pub struct GeminiChatBackend {
    inner: GeminiBackend,
    turns: Mutex<Vec<Content>>,
    name: String,
}

impl GeminiChatBackend {
    /// Wrap a stateless backend with conversation memory
    #[must_use]
    pub fn new(inner: GeminiBackend) -> Self {
        let name = format!("gemini-chat/{}", inner.model());
        Self {
            inner,
            turns: Mutex::new(Vec::new()),
            name,
        }
    }

    /// Number of turns currently remembered
    pub async fn turn_count(&self) -> usize {
        self.turns.lock().await.len()
    }
}

#[async_trait]
impl Backend for GeminiChatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: &str) -> BackendOutcome {
        let mut turns = self.turns.lock().await;

        let mut contents = turns.clone();
        contents.push(Content::text(Some("user"), prompt));

        let outcome = self.inner.generate(&contents).await;
        if let BackendOutcome::Success(reply) = &outcome {
            turns.push(Content::text(Some("user"), prompt));
            turns.push(Content::text(Some("model"), reply));

            let excess = turns.len().saturating_sub(MAX_CHAT_TURNS);
            turns.drain(..excess);
        }

        outcome
    }
}
