//! Login inputs and the outcomes the backend can answer with.

use serde::{Deserialize, Serialize};

use super::token::TokenPair;
use super::user::User;
use crate::error::{DomainError, DomainResult};

/// Email/password credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login identifier, usually an email address.
    pub email: String,
    /// Secret for the identifier.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Checks that both fields are present.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first missing field.
    pub fn validate(&self) -> DomainResult<()> {
        if self.email.trim().is_empty() {
            return Err(DomainError::invalid("email", "must not be empty"));
        }
        if self.password.is_empty() {
            return Err(DomainError::invalid("password", "must not be empty"));
        }
        Ok(())
    }

    /// Identifier used as the rate-limit key.
    #[must_use]
    pub fn rate_limit_key(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Pending second-factor challenge returned by a login that needs MFA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaChallenge {
    /// Opaque token binding the verification to the first factor.
    pub challenge_token: String,
    /// Identifier the challenge was issued for.
    pub email: String,
}

/// Tokens and user returned by a completed authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    /// Issued token pair.
    pub tokens: TokenPair,
    /// Authenticated user.
    pub user: User,
}

/// Result of the first login step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// No further factor required.
    Authenticated(AuthGrant),
    /// A second factor must be verified before tokens are issued.
    MfaRequired(MfaChallenge),
}
