//! Authentication and session lifecycle.
//!
//! [`SessionManager`] is the only writer of the session. It uses:
//! - [`LoginRateLimiter`] to throttle failed logins per identifier
//! - [`TokenBlacklist`] to refuse tokens that were logged out or rotated
//! - refresh and idle timers owned as [`crate::polling::TaskHandle`]s

mod blacklist;
mod events;
mod rate_limiter;
mod session_manager;
mod status;

pub use blacklist::TokenBlacklist;
pub use events::SessionEvent;
pub use rate_limiter::{LoginRateLimiter, RateLimitCounter};
pub use session_manager::{SessionManager, refresh_due_at};
pub use status::TokenStatus;
