//! Per-client conversation history.
//!
//! Each session holds a flat list of strings, most recent first, laid out
//! as `[question, answer, older question, older answer, ...]`. Sessions are
//! created on first append and live for the process lifetime.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Default number of entries kept per session.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Session histories behind their own lock.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Vec<String>>>,
    max_entries: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl SessionStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    /// History for `session`, most recent first. Unknown sessions are empty.
    pub fn history(&self, session: &str) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session)
            .cloned()
            .unwrap_or_default()
    }

    /// Put a question and its answer at the front of the session's history.
    ///
    /// When the history grows past the cap the oldest entries are dropped.
    pub fn append(&self, session: &str, question: &str, answer: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let entries = sessions.entry(session.to_string()).or_default();
        entries.splice(0..0, [question.to_string(), answer.to_string()]);
        if entries.len() > self.max_entries {
            entries.truncate(self.max_entries);
        }
    }

    /// Number of known sessions.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
