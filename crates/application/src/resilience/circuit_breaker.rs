//! Process-wide circuit breaker.

use std::sync::Arc;

use cosmos_domain::{BreakerDecision, BreakerEvent, BreakerPolicy, BreakerState, CircuitState};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::ports::Clock;

/// Shared circuit breaker.
///
/// All updates go through [`BreakerState::apply`] while holding the lock,
/// so concurrent requests never interleave a read-modify-write.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    policy: BreakerPolicy,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(policy: BreakerPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            policy,
            clock,
        }
    }

    /// Asks to send a request. Returns false while the breaker is open.
    pub fn try_acquire(&self) -> bool {
        self.apply(BreakerEvent::Acquire) == BreakerDecision::Allow
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        self.apply(BreakerEvent::Success);
    }

    /// Records a call that failed for transient reasons.
    pub fn record_failure(&self) {
        self.apply(BreakerEvent::Failure);
    }

    /// Current state, with an elapsed open period already turned half-open.
    #[must_use]
    pub fn snapshot(&self) -> BreakerState {
        let mut state = self.state.lock();
        state.expire_open(&self.policy, self.clock.now());
        *state
    }

    /// Current position.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.snapshot().state
    }

    /// Policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }

    fn apply(&self, event: BreakerEvent) -> BreakerDecision {
        let now = self.clock.now();
        let (before, after, decision) = {
            let mut state = self.state.lock();
            let before = state.state;
            let decision = state.apply(event, &self.policy, now);
            (before, *state, decision)
        };
        if before != after.state {
            match after.state {
                CircuitState::Open => warn!(
                    failures = after.consecutive_failures,
                    "circuit breaker opened"
                ),
                CircuitState::HalfOpen => info!("circuit breaker half-open, admitting probe"),
                CircuitState::Closed => info!("circuit breaker closed"),
            }
        }
        decision
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &*self.state.lock())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
