//! Clock port for time-related operations

use chrono::{DateTime, Utc};

/// Port for getting the current time.
///
/// Session expiry, idle detection, rate-limit windows and the circuit
/// breaker's reset timeout all read time through this trait so tests can
/// drive them without waiting.
pub trait Clock: Send + Sync {
    /// Returns the current UTC timestamp.
    fn now(&self) -> DateTime<Utc>;
}
