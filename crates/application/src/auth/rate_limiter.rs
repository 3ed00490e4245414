//! Login attempt limiting per identifier.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use cosmos_domain::{ApiError, SessionSettings};
use parking_lot::Mutex;

use crate::ports::Clock;

/// Failed attempts for one identifier within the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitCounter {
    /// Failures counted in this window.
    pub attempt_count: u32,
    /// Time of the first failure in this window.
    pub window_start: DateTime<Utc>,
}

/// Counts failed logins per identifier over a rolling window.
///
/// All updates happen synchronously under one lock; no `await` sits
/// between reading and writing a counter.
pub struct LoginRateLimiter {
    counters: Mutex<HashMap<String, RateLimitCounter>>,
    max_attempts: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl LoginRateLimiter {
    /// Creates a limiter allowing `max_attempts` failures per `window`.
    #[must_use]
    pub fn new(max_attempts: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            max_attempts,
            window,
            clock,
        }
    }

    /// Creates a limiter from session settings.
    #[must_use]
    pub fn from_settings(settings: &SessionSettings, clock: Arc<dyn Clock>) -> Self {
        Self::new(settings.max_login_attempts, settings.login_window(), clock)
    }

    /// Rejects the identifier if its failures in the window reached the limit.
    ///
    /// # Errors
    ///
    /// Returns a rate-limited error naming the seconds until the window ends.
    pub fn check(&self, key: &str) -> Result<(), ApiError> {
        let now = self.clock.now();
        let mut counters = self.counters.lock();
        let Some(counter) = counters.get(key).copied() else {
            return Ok(());
        };
        if self.expired(&counter, now) {
            counters.remove(key);
            return Ok(());
        }
        if counter.attempt_count >= self.max_attempts {
            let retry_in = (counter.window_start + self.window - now).num_seconds().max(1);
            return Err(ApiError::rate_limited(format!(
                "too many login attempts, try again in {retry_in} seconds"
            )));
        }
        Ok(())
    }

    /// Counts a failed attempt. Counters whose window has passed are dropped.
    pub fn record_failure(&self, key: &str) {
        let now = self.clock.now();
        let mut counters = self.counters.lock();
        counters.retain(|_, counter| !self.expired(counter, now));
        let counter = counters.entry(key.to_string()).or_insert(RateLimitCounter {
            attempt_count: 0,
            window_start: now,
        });
        if now - counter.window_start >= self.window {
            *counter = RateLimitCounter {
                attempt_count: 0,
                window_start: now,
            };
        }
        counter.attempt_count += 1;
    }

    /// Forgets the identifier's failures.
    pub fn reset(&self, key: &str) {
        self.counters.lock().remove(key);
    }

    /// Current counter for an identifier, if any.
    #[must_use]
    pub fn counter(&self, key: &str) -> Option<RateLimitCounter> {
        let now = self.clock.now();
        self.counters
            .lock()
            .get(key)
            .copied()
            .filter(|counter| !self.expired(counter, now))
    }

    /// Number of identifiers with a live counter.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.counters.lock().len()
    }

    fn expired(&self, counter: &RateLimitCounter, now: DateTime<Utc>) -> bool {
        now - counter.window_start >= self.window
    }
}

impl std::fmt::Debug for LoginRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRateLimiter")
            .field("tracked", &self.tracked())
            .field("max_attempts", &self.max_attempts)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
