//! Per-session chat history
//!
//! Each session owns a [`ChatHistory`] that keeps the most recent
//! [`HISTORY_LIMIT`] exchanges. Sessions live in a [`SessionStore`] and are
//! dropped after a period of inactivity, taking their reply audio with them.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::notification::RemovalCause;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Maximum number of exchanges kept per session
pub const HISTORY_LIMIT: usize = 50;

/// One user message and the reply it received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryEntry {
    pub user: String,
    pub system: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only ledger bounded to the most recent exchanges
#[derive(Debug, Clone)]
pub struct ChatHistory {
    entries: VecDeque<ChatHistoryEntry>,
    limit: usize,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }
}

impl ChatHistory {
    /// Create an empty history with the default limit
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty history keeping at most `limit` entries
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit.min(HISTORY_LIMIT) + 1),
            limit: limit.max(1),
        }
    }

    /// Record an exchange stamped with the current time
    pub fn append(&mut self, user: &str, system: &str) {
        self.append_at(user, system, Utc::now());
    }

    /// Record an exchange with an explicit timestamp
    pub fn append_at(&mut self, user: &str, system: &str, timestamp: DateTime<Utc>) {
        self.entries.push_back(ChatHistoryEntry {
            user: user.to_string(),
            system: system.to_string(),
            timestamp,
        });

        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    /// All retained entries, oldest first
    #[must_use]
    pub fn entries(&self) -> Vec<ChatHistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Iterate retained entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &ChatHistoryEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle to one session's history
pub type SharedHistory = Arc<Mutex<ChatHistory>>;

/// Upper bound on live sessions, and so on synthesized audio files
const MAX_SESSIONS: u64 = 10_000;

/// File name of a session's synthesized reply
#[must_use]
pub fn audio_file_name(session_id: &str) -> String {
    format!("{session_id}.mp3")
}

/// Session id → history, expiring idle sessions
///
/// When built with an audio directory, a session's reply audio is deleted
/// as soon as the session leaves the store.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<String, SharedHistory>,
    audio_dir: Option<PathBuf>,
}

impl SessionStore {
    /// Default idle period after which a session is forgotten
    pub const DEFAULT_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

    /// Create a store that forgets sessions idle for longer than `idle`
    #[must_use]
    pub fn new(idle: Duration) -> Self {
        Self::build(idle, MAX_SESSIONS, None)
    }

    /// Create a store that also owns the per-session audio files in `audio_dir`
    #[must_use]
    pub fn with_audio_dir(idle: Duration, audio_dir: PathBuf) -> Self {
        Self::build(idle, MAX_SESSIONS, Some(audio_dir))
    }

    /// Create a store holding at most `capacity` sessions
    #[must_use]
    pub fn build(idle: Duration, capacity: u64, audio_dir: Option<PathBuf>) -> Self {
        let mut builder = Cache::builder().max_capacity(capacity).time_to_idle(idle);

        if let Some(dir) = audio_dir.clone() {
            builder = builder.eviction_listener(
                move |id: Arc<String>, _history: SharedHistory, cause: RemovalCause| {
                    if cause != RemovalCause::Replaced {
                        remove_audio(&dir.join(audio_file_name(&id)));
                    }
                },
            );
        }

        Self {
            sessions: builder.build(),
            audio_dir,
        }
    }

    /// Directory holding per-session audio, if the store manages one
    #[must_use]
    pub fn audio_dir(&self) -> Option<&Path> {
        self.audio_dir.as_deref()
    }

    /// History for `session_id`, created empty on first access
    #[must_use]
    pub fn history(&self, session_id: &str) -> SharedHistory {
        self.sessions.get_with(session_id.to_string(), || {
            tracing::debug!(session = %session_id, "creating chat history");
            Arc::new(Mutex::new(ChatHistory::new()))
        })
    }

    /// Copy of a session's entries, empty for unknown sessions
    pub async fn snapshot(&self, session_id: &str) -> Vec<ChatHistoryEntry> {
        let Some(history) = self.sessions.get(session_id) else {
            return Vec::new();
        };
        let guard = history.lock().await;
        guard.entries()
    }

    /// Forget a session and its audio
    pub fn remove(&self, session_id: &str) {
        self.sessions.invalidate(session_id);
    }

    /// Apply pending expirations and evictions now
    pub fn run_pending_tasks(&self) {
        self.sessions.run_pending_tasks();
    }

    /// Number of live sessions, after pending maintenance
    #[must_use]
    pub fn len(&self) -> u64 {
        self.sessions.run_pending_tasks();
        self.sessions.entry_count()
    }

    /// Whether no session is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete audio files that belong to no live session
    ///
    /// Used at startup, when files left by a previous process have no owner.
    /// Returns how many files were removed.
    pub fn purge_orphaned_audio(&self) -> usize {
        let Some(dir) = &self.audio_dir else {
            return 0;
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".mp3"))
            else {
                continue;
            };
            if !self.sessions.contains_key(id) && remove_audio(&path) {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(path = %dir.display(), removed, "purged orphaned audio");
        }
        removed
    }
}

/// Delete one audio file; a file that never existed is not an error
fn remove_audio(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed session audio");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove session audio");
            false
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_IDLE)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.entry_count())
            .field("audio_dir", &self.audio_dir)
            .finish()
    }
}
