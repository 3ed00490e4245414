//! Circuit breaker state machine.
//!
//! This is the pure part of the breaker: every transition is a method on
//! [`BreakerState`] that takes the current time. The application layer owns
//! one instance per process behind a lock and funnels every outcome through
//! [`BreakerState::apply`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::ResilienceSettings;

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally.
    #[default]
    Closed,
    /// Calls are rejected without contacting the server.
    Open,
    /// Calls are admitted as probes.
    HalfOpen,
}

/// Thresholds driving the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerPolicy {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Open period before a probe is admitted.
    pub reset_timeout: Duration,
    /// Probe successes that close the breaker.
    pub success_threshold: u32,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self::from(&ResilienceSettings::default())
    }
}

impl From<&ResilienceSettings> for BreakerPolicy {
    fn from(settings: &ResilienceSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            reset_timeout: settings.reset_timeout(),
            success_threshold: settings.half_open_success_threshold.max(1),
        }
    }
}

/// Event fed into the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerEvent {
    /// A call wants to go out.
    Acquire,
    /// A call succeeded.
    Success,
    /// A call failed in a way that indicates an unhealthy service.
    Failure,
}

/// What the breaker decided for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    /// The call may proceed (or the outcome was recorded).
    Allow,
    /// The call must fail fast.
    Reject,
}

/// Full breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerState {
    /// Current position.
    pub state: CircuitState,
    /// Failures since the last success while closed.
    pub consecutive_failures: u32,
    /// Time of the most recent failure.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Probe successes while half-open.
    pub half_open_successes: u32,
    /// When the breaker last opened.
    pub opened_at: Option<DateTime<Utc>>,
}

impl BreakerState {
    /// Applies an event and returns the decision.
    pub fn apply(
        &mut self,
        event: BreakerEvent,
        policy: &BreakerPolicy,
        now: DateTime<Utc>,
    ) -> BreakerDecision {
        self.expire_open(policy, now);
        match event {
            BreakerEvent::Acquire => {
                if self.state == CircuitState::Open {
                    BreakerDecision::Reject
                } else {
                    BreakerDecision::Allow
                }
            }
            BreakerEvent::Success => {
                self.on_success(policy);
                BreakerDecision::Allow
            }
            BreakerEvent::Failure => {
                self.on_failure(policy, now);
                BreakerDecision::Allow
            }
        }
    }

    /// Moves an open breaker to half-open once the reset timeout elapsed.
    pub fn expire_open(&mut self, policy: &BreakerPolicy, now: DateTime<Utc>) {
        if self.state == CircuitState::Open
            && self
                .opened_at
                .is_none_or(|opened| now - opened >= policy.reset_timeout)
        {
            self.state = CircuitState::HalfOpen;
            self.half_open_successes = 0;
        }
    }

    fn on_success(&mut self, policy: &BreakerPolicy) {
        match self.state {
            CircuitState::Closed => self.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= policy.success_threshold {
                    self.state = CircuitState::Closed;
                    self.consecutive_failures = 0;
                    self.half_open_successes = 0;
                    self.opened_at = None;
                }
            }
            // A call admitted before the breaker opened; it does not heal it.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&mut self, policy: &BreakerPolicy, now: DateTime<Utc>) {
        self.last_failure_at = Some(now);
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= policy.failure_threshold {
                    self.open(now);
                }
            }
            CircuitState::HalfOpen => {
                self.consecutive_failures += 1;
                self.open(now);
            }
            CircuitState::Open => self.consecutive_failures += 1,
        }
    }

    fn open(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.half_open_successes = 0;
    }
}
