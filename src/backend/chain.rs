//! Ordered fallback across backend tiers

use std::sync::Arc;
use std::time::Duration;

use super::{Backend, BackendOutcome};

/// Reply returned when every tier has failed
///
/// Never cached.
pub const APOLOGY: &str =
    "Sorry, all AI services are unavailable right now. Please try again later.";

/// Time budget for a single tier
pub const DEFAULT_TIER_TIMEOUT: Duration = Duration::from_secs(10);

/// Whether `text` is the apology reply
#[must_use]
pub fn is_apology(text: &str) -> bool {
    text == APOLOGY
}

/// Tries each backend tier once, in priority order, until one succeeds
///
/// Quota errors and every other failure both advance to the next tier.
/// There is no backoff and no retry of a tier within a request.
#[derive(Clone)]
pub struct FallbackChain {
    tiers: Vec<Arc<dyn Backend>>,
    tier_timeout: Duration,
}

impl FallbackChain {
    /// Build a chain over `tiers` with the default per-tier timeout
    #[must_use]
    pub fn new(tiers: Vec<Arc<dyn Backend>>) -> Self {
        Self {
            tiers,
            tier_timeout: DEFAULT_TIER_TIMEOUT,
        }
    }

    /// Override the per-tier timeout
    #[must_use]
    pub const fn with_tier_timeout(mut self, timeout: Duration) -> Self {
        self.tier_timeout = timeout;
        self
    }

    /// Tier names in priority order
    #[must_use]
    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Get a reply for `query`, or [`APOLOGY`] once every tier has failed
    pub async fn resolve(&self, query: &str) -> String {
        for (position, tier) in self.tiers.iter().enumerate() {
            let outcome = tokio::time::timeout(self.tier_timeout, tier.invoke(query))
                .await
                .unwrap_or_else(|_| {
                    BackendOutcome::Failure(format!(
                        "timed out after {}s",
                        self.tier_timeout.as_secs_f32()
                    ))
                });

            match outcome {
                BackendOutcome::Success(text) => {
                    tracing::info!(tier = tier.name(), position, "backend replied");
                    return text;
                }
                BackendOutcome::QuotaExceeded(detail) => {
                    tracing::warn!(
                        tier = tier.name(),
                        detail = %detail,
                        "backend quota exceeded, trying next tier"
                    );
                }
                BackendOutcome::Failure(detail) => {
                    tracing::warn!(
                        tier = tier.name(),
                        detail = %detail,
                        "backend failed, trying next tier"
                    );
                }
            }
        }

        tracing::error!(tiers = self.tiers.len(), "all backend tiers failed");
        APOLOGY.to_string()
    }
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("tiers", &self.tier_names())
            .field("tier_timeout", &self.tier_timeout)
            .finish()
    }
}
