//! Query similarity and cache keys
//!
//! Two queries count as the same question when their normalized forms match
//! or their word sets overlap by more than [`SIMILARITY_THRESHOLD`] (Jaccard).
//! Punctuation is not stripped, so "time?" and "time" are different words.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

/// Jaccard similarity a pair of queries must exceed to be treated as equal
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Lowercase and collapse runs of whitespace into single spaces
#[must_use]
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Jaccard similarity of the whitespace-separated word sets of two strings
///
/// Returns `0.0` when both sets are empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn jaccard(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();

    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }

    let intersection = left.intersection(&right).count();
    intersection as f64 / union as f64
}

/// Decide whether two queries should share a cached response
#[must_use]
pub fn is_similar(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);

    if a == b {
        return true;
    }

    jaccard(&a, &b) > SIMILARITY_THRESHOLD
}

/// Content digest of the raw query, used to label cache entries
///
/// Computed over the unnormalized bytes: paraphrases get different keys and
/// are matched by [`is_similar`] during the cache scan instead.
#[must_use]
pub fn cache_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
