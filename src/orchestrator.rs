//! Per-query response resolution
//!
//! Cache first, then the backend fallback chain. Fresh replies are cached
//! unless they are the apology, and every exchange lands in the caller's
//! history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::backend::{FallbackChain, is_apology};
use crate::cache::ResponseCache;
use crate::history::ChatHistory;

/// Reply to one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub response_text: String,
    /// Whether the reply came from the cache
    pub cached: bool,
}

/// Resolves queries against the shared cache and backend chain
///
/// The cache lock is held for the lookup and for the store, never while a
/// backend is being called.
#[derive(Debug)]
pub struct RequestOrchestrator {
    cache: Mutex<ResponseCache>,
    chain: FallbackChain,
}

impl RequestOrchestrator {
    #[must_use]
    pub fn new(cache: ResponseCache, chain: FallbackChain) -> Self {
        Self {
            cache: Mutex::new(cache),
            chain,
        }
    }

    /// The backend chain used on cache misses
    #[must_use]
    pub const fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    /// Number of entries currently in the cache
    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Resolve `query` now and record the exchange in `history`
    pub async fn handle(&self, query: &str, history: &mut ChatHistory) -> Reply {
        self.handle_at(query, Utc::now(), history).await
    }

    /// Resolve `query` as of `now` and record the exchange in `history`
    pub async fn handle_at(
        &self,
        query: &str,
        now: DateTime<Utc>,
        history: &mut ChatHistory,
    ) -> Reply {
        let cached = self.cache.lock().await.lookup(query, now);

        let reply = if let Some(response_text) = cached {
            tracing::info!("answered from cache");
            Reply {
                response_text,
                cached: true,
            }
        } else {
            let response_text = self.chain.resolve(query).await;

            if is_apology(&response_text) {
                tracing::debug!("not caching apology");
            } else {
                self.cache.lock().await.store(query, &response_text, now);
            }

            Reply {
                response_text,
                cached: false,
            }
        };

        history.append(query, &reply.response_text);
        reply
    }
}
