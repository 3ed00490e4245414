//! Authentication backend port.

use async_trait::async_trait;
use cosmos_domain::{ApiError, AuthGrant, Credentials, LoginOutcome, MfaChallenge, TokenPair, User};

/// Server-side authentication operations.
///
/// Implementations talk to `/api/v1/auth/*`. The session manager owns all
/// local state; a backend only translates calls.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// First login step.
    async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome, ApiError>;

    /// Completes a login that required a second factor.
    async fn verify_mfa(&self, challenge: &MfaChallenge, code: &str) -> Result<AuthGrant, ApiError>;

    /// Exchanges an OAuth authorization code.
    async fn oauth_exchange(&self, provider: &str, code: &str) -> Result<AuthGrant, ApiError>;

    /// Obtains a new token pair.
    async fn refresh(&self, tokens: &TokenPair) -> Result<TokenPair, ApiError>;

    /// Invalidates the token on the server.
    async fn logout(&self, access_token: &str) -> Result<(), ApiError>;

    /// Fetches the user the token belongs to.
    async fn current_user(&self, access_token: &str) -> Result<User, ApiError>;
}

/// Supplies the bearer token attached to outgoing requests.
pub trait AccessTokenSource: Send + Sync {
    /// Current token, if a session is active.
    fn access_token(&self) -> Option<String>;
}
