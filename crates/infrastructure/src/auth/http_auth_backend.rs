//! `AuthBackend` over the platform's `/api/v1/auth` endpoints.
//!
//! Requests go through the shared [`RequestExecutor`], so auth calls count
//! toward the same circuit breaker as every other call. Bodies are camelCase
//! JSON; the token may arrive as `token` or `accessToken`.

use std::sync::Arc;

use async_trait::async_trait;
use cosmos_application::RequestExecutor;
use cosmos_application::ports::{AuthBackend, Clock};
use cosmos_domain::{
    ApiError, ApiRequest, AuthGrant, Credentials, LoginOutcome, MfaChallenge, TokenPair, User,
    api_path,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reply to login, MFA verification and OAuth callbacks.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantResponse {
    #[serde(default)]
    mfa_required: bool,
    #[serde(default)]
    mfa_token: Option<String>,
    #[serde(default, alias = "accessToken")]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    user: Option<User>,
}

/// Reply to a refresh.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(alias = "accessToken")]
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MfaBody<'a> {
    mfa_token: &'a str,
    code: &'a str,
}

#[derive(Serialize)]
struct CodeBody<'a> {
    code: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// HTTP implementation of [`AuthBackend`].
#[derive(Clone)]
pub struct HttpAuthBackend {
    executor: RequestExecutor,
    clock: Arc<dyn Clock>,
}

impl HttpAuthBackend {
    /// Creates a backend sending through `executor`.
    ///
    /// `clock` resolves the relative `expiresIn` hints into timestamps.
    #[must_use]
    pub fn new(executor: RequestExecutor, clock: Arc<dyn Clock>) -> Self {
        Self { executor, clock }
    }

    fn tokens(&self, token: String, refresh_token: Option<String>, expires_in: Option<u64>) -> TokenPair {
        TokenPair::new(token, refresh_token, expires_in, self.clock.now())
    }

    /// Turns a reply carrying tokens into a grant, fetching the user when the
    /// server left it out.
    async fn grant(&self, response: GrantResponse) -> Result<AuthGrant, ApiError> {
        let token = response
            .token
            .ok_or_else(|| ApiError::internal("authentication response carried no token"))?;
        let tokens = self.tokens(token, response.refresh_token, response.expires_in);
        let user = match response.user {
            Some(user) => user,
            None => self.current_user(&tokens.access_token).await?,
        };
        Ok(AuthGrant { tokens, user })
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome, ApiError> {
        let request = ApiRequest::post(api_path(&["auth", "login"])).anonymous();
        let response: GrantResponse = self
            .executor
            .request_json(request, credentials)
            .await
            .into_result()?;

        if response.mfa_required {
            let challenge_token = response
                .mfa_token
                .ok_or_else(|| ApiError::internal("MFA required but no challenge token issued"))?;
            debug!(email = %credentials.email, "second factor required");
            return Ok(LoginOutcome::MfaRequired(MfaChallenge {
                challenge_token,
                email: credentials.email.clone(),
            }));
        }

        self.grant(response).await.map(LoginOutcome::Authenticated)
    }

    async fn verify_mfa(&self, challenge: &MfaChallenge, code: &str) -> Result<AuthGrant, ApiError> {
        let request = ApiRequest::post(api_path(&["auth", "mfa", "verify"])).anonymous();
        let body = MfaBody {
            mfa_token: &challenge.challenge_token,
            code,
        };
        let response: GrantResponse = self.executor.request_json(request, &body).await.into_result()?;
        self.grant(response).await
    }

    async fn oauth_exchange(&self, provider: &str, code: &str) -> Result<AuthGrant, ApiError> {
        let request =
            ApiRequest::post(api_path(&["auth", "oauth", provider, "callback"])).anonymous();
        let response: GrantResponse = self
            .executor
            .request_json(request, &CodeBody { code })
            .await
            .into_result()?;
        self.grant(response).await
    }

    async fn refresh(&self, tokens: &TokenPair) -> Result<TokenPair, ApiError> {
        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .ok_or_else(|| ApiError::auth("no refresh token available"))?;
        let request = ApiRequest::post(api_path(&["auth", "refresh"])).anonymous();
        let response: RefreshResponse = self
            .executor
            .request_json(request, &RefreshBody { refresh_token })
            .await
            .into_result()?;
        Ok(self.tokens(response.token, response.refresh_token, response.expires_in))
    }

    async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post(api_path(&["auth", "logout"])).bearer(access_token);
        self.executor
            .request::<serde_json::Value>(request)
            .await
            .into_result()
            .map(drop)
    }

    async fn current_user(&self, access_token: &str) -> Result<User, ApiError> {
        let request = ApiRequest::get(api_path(&["auth", "me"])).bearer(access_token);
        self.executor.request(request).await.into_result()
    }
}

impl std::fmt::Debug for HttpAuthBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthBackend")
            .field("base_url", &self.executor.base_url().as_str())
            .finish_non_exhaustive()
    }
}
