//! Client-side session state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::token::{TokenPair, token_preview};
use super::user::User;

/// Where the session is in the login state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No user is logged in.
    #[default]
    Unauthenticated,
    /// First factor accepted, waiting for the second.
    MfaPending,
    /// Tokens issued and user loaded.
    Authenticated,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The user asked to log out.
    UserRequested,
    /// No activity within the idle threshold.
    IdleTimeout,
    /// The token could not be refreshed.
    RefreshFailed,
    /// A persisted session could not be resumed.
    RestoreFailed,
}

impl LogoutReason {
    /// Short description for notices.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::UserRequested => "Logged out",
            Self::IdleTimeout => "Logged out after inactivity",
            Self::RefreshFailed => "Session expired",
            Self::RestoreFailed => "Saved session is no longer valid",
        }
    }
}

/// Snapshot of the client session.
///
/// Owned by the session manager; everyone else reads copies.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Session {
    /// Whether a user is logged in.
    pub authenticated: bool,
    /// The logged-in user.
    pub user: Option<User>,
    /// Current bearer token.
    pub access_token: Option<String>,
    /// Current refresh token.
    pub refresh_token: Option<String>,
    /// When the current token pair was obtained.
    pub issued_at: Option<DateTime<Utc>>,
    /// Last recorded user activity.
    pub last_activity: Option<DateTime<Utc>>,
    /// Whether a second factor is awaited.
    pub mfa_pending: bool,
    /// Claimed expiry of the current access token.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates an authenticated session from a fresh grant.
    #[must_use]
    pub fn authenticated(user: User, tokens: &TokenPair, now: DateTime<Utc>) -> Self {
        Self {
            authenticated: true,
            user: Some(user),
            access_token: Some(tokens.access_token.clone()),
            refresh_token: tokens.refresh_token.clone(),
            issued_at: Some(now),
            last_activity: Some(now),
            mfa_pending: false,
            expires_at: tokens.expiry(),
        }
    }

    /// Creates a session waiting for the second factor.
    #[must_use]
    pub fn mfa_pending() -> Self {
        Self {
            mfa_pending: true,
            ..Self::default()
        }
    }

    /// Current state machine phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        if self.authenticated {
            SessionPhase::Authenticated
        } else if self.mfa_pending {
            SessionPhase::MfaPending
        } else {
            SessionPhase::Unauthenticated
        }
    }

    /// Returns true when a user is logged in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Time since the last recorded activity.
    #[must_use]
    pub fn idle_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_activity.map(|at| now - at)
    }

    /// Replaces the tokens after a refresh.
    pub fn apply_refresh(&mut self, tokens: &TokenPair, now: DateTime<Utc>) {
        self.access_token = Some(tokens.access_token.clone());
        if tokens.refresh_token.is_some() {
            self.refresh_token.clone_from(&tokens.refresh_token);
        }
        self.issued_at = Some(now);
        self.expires_at = tokens.expiry();
    }

    /// Current tokens as a pair, if authenticated.
    #[must_use]
    pub fn token_pair(&self) -> Option<TokenPair> {
        self.access_token.as_ref().map(|access| TokenPair {
            access_token: access.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.authenticated)
            .field("user", &self.user.as_ref().map(|u| &u.email))
            .field("access_token", &self.access_token.as_deref().map(token_preview))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("issued_at", &self.issued_at)
            .field("last_activity", &self.last_activity)
            .field("mfa_pending", &self.mfa_pending)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
