//! Circuit breaker, retry policy and the request executor built on them.

mod circuit_breaker;
mod executor;
mod retry;

pub use circuit_breaker::CircuitBreaker;
pub use executor::RequestExecutor;
pub use retry::RetryPolicy;
