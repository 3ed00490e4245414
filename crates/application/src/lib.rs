//! Cosmos Application - Session, resilience and services
//!
//! This crate holds the client logic that sits between the domain types and
//! the outside world:
//! - ports (traits) implemented by the infrastructure adapters
//! - the session manager with its rate limiter, blacklist and timers
//! - the request executor with circuit breaker and retries
//! - platform services, the push monitor and the state store

pub mod auth;
pub mod monitor;
pub mod polling;
pub mod ports;
pub mod resilience;
pub mod services;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use auth::{LoginRateLimiter, SessionEvent, SessionManager, TokenBlacklist, TokenStatus};
pub use monitor::Monitor;
pub use polling::{TaskHandle, Watch};
pub use resilience::{CircuitBreaker, RequestExecutor, RetryPolicy};
pub use services::{DatasetService, GenerationService, ModelService, SafetyService, TrainingService};
pub use store::{Action, AppState, Effects, Store};
