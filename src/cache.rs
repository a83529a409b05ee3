//! In-memory response cache with fuzzy lookup
//!
//! Entries are labelled by [`cache_key`] but never fetched by key: a lookup
//! scans every entry in insertion order and returns the first live one whose
//! query [`is_similar`] to the incoming query. Expired entries are dropped
//! when a scan reaches them.

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;

use crate::similarity::{cache_key, is_similar};

/// Default entry lifetime (one hour)
pub const DEFAULT_TTL: Duration = Duration::hours(1);

/// A cached model response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// When the response was stored
    pub created_at: DateTime<Utc>,
    /// The query as originally asked
    pub query: String,
    /// The response text
    pub response: String,
}

/// Response cache keyed by raw-query digest, searched by similarity
#[derive(Debug)]
pub struct ResponseCache {
    entries: IndexMap<String, CacheEntry>,
    ttl: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ResponseCache {
    /// Create an empty cache with the given entry lifetime
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: IndexMap::new(),
            ttl,
        }
    }

    /// Entry lifetime
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Find a live cached response for a query similar to `query`
    ///
    /// Expired entries met during the scan are removed. The scan stops at the
    /// first match, so entries after it are left as they are.
    pub fn lookup(&mut self, query: &str, now: DateTime<Utc>) -> Option<String> {
        let mut index = 0;
        while let Some((key, entry)) = self.entries.get_index(index) {
            if now - entry.created_at > self.ttl {
                tracing::debug!(key = %short(key), "cache entry expired, removing");
                self.entries.shift_remove_index(index);
                continue;
            }

            if is_similar(query, &entry.query) {
                tracing::debug!(key = %short(key), "cache hit");
                return Some(entry.response.clone());
            }

            index += 1;
        }

        None
    }

    /// Store a response under the digest of `query`, replacing any previous one
    ///
    /// Replacing keeps the entry's original position in the scan order.
    pub fn store(&mut self, query: &str, response: &str, now: DateTime<Utc>) {
        let key = cache_key(query);
        tracing::debug!(key = %short(&key), "storing response in cache");

        self.entries.insert(
            key,
            CacheEntry {
                created_at: now,
                query: query.to_string(),
                response: response.to_string(),
            },
        );
    }

    /// Whether an entry is stored under `key` (expired or not)
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored entries, including expired ones not yet scanned
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn short(key: &str) -> &str {
    &key[..8.min(key.len())]
}
