//! Session lifecycle notifications.

use chrono::{DateTime, Utc};
use cosmos_domain::LogoutReason;

/// Events emitted by the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session was established.
    LoggedIn {
        /// User id.
        user_id: String,
        /// User email.
        email: String,
    },
    /// The first factor was accepted and a code is expected.
    MfaRequired {
        /// Identifier the challenge belongs to.
        email: String,
    },
    /// The access token was replaced.
    TokenRefreshed {
        /// Preview of the new token.
        token_preview: String,
        /// Claimed expiry of the new token.
        expires_at: Option<DateTime<Utc>>,
    },
    /// The session ended.
    LoggedOut {
        /// Why it ended.
        reason: LogoutReason,
    },
}
