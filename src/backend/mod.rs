//! Generative-text backends and the fallback chain that tries them in order

mod chain;
mod gemini;

use async_trait::async_trait;

pub use chain::{APOLOGY, DEFAULT_TIER_TIMEOUT, FallbackChain, is_apology};
pub use gemini::{GEMINI_API_BASE, GeminiBackend, GeminiChatBackend};

/// Result of asking one backend tier for a completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOutcome {
    /// The backend produced a reply
    Success(String),
    /// The backend refused because of rate limiting or an exhausted quota
    QuotaExceeded(String),
    /// Any other failure: network, timeout, malformed payload, bad status
    Failure(String),
}

impl BackendOutcome {
    /// Map an HTTP error status and body to a failure outcome
    #[must_use]
    pub fn from_error(status: Option<u16>, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if is_quota_error(status, &detail) {
            Self::QuotaExceeded(detail)
        } else {
            Self::Failure(detail)
        }
    }
}

/// One callable tier of the fallback chain
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Ask for a completion of `prompt`
    ///
    /// Implementations never panic on remote errors; every failure is folded
    /// into a [`BackendOutcome`].
    async fn invoke(&self, prompt: &str) -> BackendOutcome;
}

/// Whether a failure signals rate limiting or quota exhaustion
///
/// True for HTTP 429, or when the message mentions `429` or `quota`.
#[must_use]
pub fn is_quota_error(status: Option<u16>, message: &str) -> bool {
    if status == Some(429) {
        return true;
    }

    message.contains("429") || message.to_lowercase().contains("quota")
}
