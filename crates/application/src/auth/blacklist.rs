//! Revoked access tokens.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::ports::Clock;

/// Tokens that must never be accepted again.
///
/// Entries with a known expiry are dropped once it passes; tokens without
/// one are kept for the life of the process.
pub struct TokenBlacklist {
    entries: Mutex<HashMap<String, Option<DateTime<Utc>>>>,
    clock: Arc<dyn Clock>,
}

impl TokenBlacklist {
    /// Creates an empty blacklist.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Revokes a token.
    pub fn add(&self, token: impl Into<String>, expires_at: Option<DateTime<Utc>>) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.retain(|_, expiry| expiry.is_none_or(|at| at > now));
        entries.insert(token.into(), expires_at);
    }

    /// Returns true if the token was revoked.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.entries.lock().contains_key(token)
    }

    /// Number of tracked tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TokenBlacklist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBlacklist")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
