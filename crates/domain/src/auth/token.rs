//! Bearer token pair and the claims the client reads from it.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Claims decoded from a JWT access token.
///
/// The signature is not verified: the client only uses the claims to plan
/// refreshes, the server remains the authority on validity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id).
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiry, seconds since the epoch.
    #[serde(default)]
    pub exp: Option<i64>,
    /// Issued at, seconds since the epoch.
    #[serde(default)]
    pub iat: Option<i64>,
    /// Token id.
    #[serde(default)]
    pub jti: Option<String>,
}

impl TokenClaims {
    /// Decodes the claims of a compact JWT without checking its signature
    /// or expiry.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MalformedToken`] if the token is not a JWT.
    pub fn decode(token: &str) -> DomainResult<Self> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        jsonwebtoken::decode::<Self>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| DomainError::MalformedToken(e.to_string()))
    }

    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    /// Issue time as a timestamp.
    #[must_use]
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

/// Access and refresh token issued together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Bearer token sent on every request.
    pub access_token: String,
    /// Token used to obtain a new pair.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry hint from the server's `expiresIn`, resolved at receipt.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    /// Creates a pair, resolving `expires_in` against `now`.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<u64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(Duration::try_seconds)
                .and_then(|lifetime| now.checked_add_signed(lifetime)),
        }
    }

    /// Claims of the access token, if it is a decodable JWT.
    #[must_use]
    pub fn claims(&self) -> Option<TokenClaims> {
        TokenClaims::decode(&self.access_token).ok()
    }

    /// The claimed expiry, falling back to the `expiresIn` hint.
    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.claims()
            .and_then(|claims| claims.expires_at())
            .or(self.expires_at)
    }

    /// Check if the token is expired or will expire within the given buffer.
    #[must_use]
    pub fn is_expired_or_expiring(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expiry().is_some_and(|expiry| now + buffer >= expiry)
    }

    /// Check if the pair can be refreshed.
    #[must_use]
    pub const fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Time until expiry in seconds, or None if no expiry is known.
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expiry().map(|expiry| (expiry - now).num_seconds())
    }

    /// Returns the Authorization header value.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &token_preview(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(token_preview))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Get a preview of a token (first 8 chars + ...).
#[must_use]
pub fn token_preview(token: &str) -> String {
    if token.len() > 12 {
        format!("{}...", token.get(..8).unwrap_or_default())
    } else {
        "***".to_string()
    }
}
