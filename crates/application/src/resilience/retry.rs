//! Retry policy for transient failures.

use std::time::Duration;

use cosmos_domain::ResilienceSettings;

/// Which failures are retried and how long to wait between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Network attempts per request, the first one included.
    pub max_attempts: u32,
    /// Wait before the first retry; doubles for each further retry.
    pub base_delay: Duration,
    /// Statuses treated as transient.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ResilienceSettings::default())
    }
}

impl From<&ResilienceSettings> for RetryPolicy {
    fn from(settings: &ResilienceSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.retry_base_delay(),
            retryable_statuses: settings.retryable_statuses.clone(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Returns true if another attempt may follow attempt number `attempts`.
    #[must_use]
    pub const fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Returns true if the status is transient.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Delay before retry number `retry` (0-based): `base × 2^retry`, or the
    /// server's `Retry-After` when that is longer.
    #[must_use]
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        let backoff = self.base_delay.saturating_mul(factor);
        retry_after.map_or(backoff, |server| server.max(backoff))
    }
}
