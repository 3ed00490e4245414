//! Token status for display.

use chrono::{DateTime, Duration, Utc};
use cosmos_domain::Session;

/// Status of the session token for UI display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    /// No token exists.
    NotAuthenticated,
    /// Token is valid and not expiring soon.
    Valid {
        /// Seconds until expiry, or None if no expiry.
        seconds_remaining: Option<i64>,
    },
    /// Token is valid but within the refresh lead.
    Expiring {
        /// Seconds until expiry.
        seconds_remaining: i64,
        /// Whether the token can be refreshed.
        can_refresh: bool,
    },
    /// Token has expired.
    Expired {
        /// Whether the token can be refreshed.
        can_refresh: bool,
    },
}

impl TokenStatus {
    /// Computes the status of the session's token.
    #[must_use]
    pub fn of(session: &Session, now: DateTime<Utc>, refresh_lead: Duration) -> Self {
        if session.access_token.is_none() {
            return Self::NotAuthenticated;
        }
        let can_refresh = session.refresh_token.is_some();
        match session.expires_at {
            None => Self::Valid {
                seconds_remaining: None,
            },
            Some(expiry) if expiry <= now => Self::Expired { can_refresh },
            Some(expiry) if expiry <= now + refresh_lead => Self::Expiring {
                seconds_remaining: (expiry - now).num_seconds(),
                can_refresh,
            },
            Some(expiry) => Self::Valid {
                seconds_remaining: Some((expiry - now).num_seconds()),
            },
        }
    }

    /// Returns true if the token is valid (not expired).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. } | Self::Expiring { .. })
    }

    /// Get a user-friendly display message.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "Not signed in".to_string(),
            Self::Valid {
                seconds_remaining: Some(secs),
            } => {
                if *secs > 3600 {
                    format!("Session valid for {} hours", secs / 3600)
                } else if *secs > 60 {
                    format!("Session valid for {} minutes", secs / 60)
                } else {
                    format!("Session valid for {secs} seconds")
                }
            }
            Self::Valid {
                seconds_remaining: None,
            } => "Session valid".to_string(),
            Self::Expiring {
                seconds_remaining,
                can_refresh,
            } => {
                let refresh_hint = if *can_refresh { " (renewing)" } else { "" };
                format!("Session expires in {seconds_remaining} seconds{refresh_hint}")
            }
            Self::Expired { .. } => "Session expired".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{epoch, token_pair, user};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_progression() {
        let now = epoch();
        let tokens = token_pair("u-1", now, Duration::hours(1));
        let session = Session::authenticated(user(), &tokens, now);
        let lead = Duration::minutes(5);

        assert_eq!(
            TokenStatus::of(&session, now, lead),
            TokenStatus::Valid {
                seconds_remaining: Some(3600)
            }
        );
        assert_eq!(
            TokenStatus::of(&session, now + Duration::minutes(58), lead),
            TokenStatus::Expiring {
                seconds_remaining: 120,
                can_refresh: true
            }
        );
        assert!(!TokenStatus::of(&session, now + Duration::hours(2), lead).is_valid());
    }

    #[test]
    fn test_empty_session() {
        let status = TokenStatus::of(&Session::default(), epoch(), Duration::minutes(5));
        assert_eq!(status, TokenStatus::NotAuthenticated);
        assert_eq!(status.display_message(), "Not signed in");
    }

    #[test]
    fn test_display_messages() {
        let valid = TokenStatus::Valid {
            seconds_remaining: Some(7200),
        };
        assert_eq!(valid.display_message(), "Session valid for 2 hours");
        let expiring = TokenStatus::Expiring {
            seconds_remaining: 30,
            can_refresh: true,
        };
        assert_eq!(expiring.display_message(), "Session expires in 30 seconds (renewing)");
    }
}
