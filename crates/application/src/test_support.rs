//! Test doubles for the application ports.
//!
//! Available to this crate's tests and, through the `test-support`
//! feature, to downstream crates.

#![allow(clippy::missing_panics_doc, clippy::expect_used, missing_docs)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use cosmos_domain::{
    ApiError, AuthGrant, BreakerPolicy, Credentials, LoginOutcome, MfaChallenge, MonitorEvent,
    Role, TokenPair, User,
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use url::Url;

use crate::ports::{
    AccessTokenSource, AuthBackend, Clock, EventStream, HttpTransport, MonitorError, PushChannel,
    StorageError, TokenStorage, TransportError, TransportRequest, TransportResponse,
};
use crate::resilience::{CircuitBreaker, RequestExecutor, RetryPolicy};

/// Fixed point all test clocks start from.
#[must_use]
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(epoch())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Clock that follows tokio's (pausable) time, so `sleep` and `now` agree.
#[derive(Debug)]
pub struct VirtualClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl VirtualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: epoch(),
            start: tokio::time::Instant::now(),
        }
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.start.elapsed()).unwrap_or_default();
        self.base + elapsed
    }
}

/// Builds a JWT with a dummy signature carrying `iat` and `exp`.
#[must_use]
pub fn fake_jwt(subject: &str, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "sub": subject,
        "iat": issued_at.timestamp(),
        "exp": expires_at.timestamp(),
        "jti": format!("{subject}-{}", issued_at.timestamp()),
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

/// Token pair whose access token expires `lifetime` after `issued_at`.
#[must_use]
pub fn token_pair(subject: &str, issued_at: DateTime<Utc>, lifetime: chrono::Duration) -> TokenPair {
    TokenPair {
        access_token: fake_jwt(subject, issued_at, issued_at + lifetime),
        refresh_token: Some(format!("refresh-{subject}-{}", issued_at.timestamp())),
        expires_at: None,
    }
}

/// A researcher account.
#[must_use]
pub fn user() -> User {
    User::new("u-1", "a@b.com", Role::Researcher)
}

/// Base URL used by test executors.
pub const TEST_BASE_URL: &str = "https://cosmos.example.com";

/// Executor over `transport` with default breaker and retry policies and
/// a manual clock.
#[must_use]
pub fn executor(transport: &Arc<ScriptedTransport>) -> RequestExecutor {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
    let breaker = Arc::new(CircuitBreaker::new(BreakerPolicy::default(), Arc::clone(&clock)));
    RequestExecutor::new(
        Arc::clone(transport) as Arc<dyn HttpTransport>,
        breaker,
        RetryPolicy::default(),
        clock,
        Url::parse(TEST_BASE_URL).expect("valid test url"),
        Duration::from_secs(30),
    )
}

enum Scripted {
    Respond(TransportResponse),
    Fail(TransportError),
    Delayed(Duration, TransportResponse),
}

/// Transport answering from a queue. An empty queue answers 500.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<TransportRequest>>,
    calls: AtomicU32,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: TransportResponse) {
        self.script.lock().push_back(Scripted::Respond(response));
    }

    pub fn push_status(&self, status: u16) {
        self.push(TransportResponse::empty(status));
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        self.push(TransportResponse::json(status, &body));
    }

    pub fn push_error(&self, error: TransportError) {
        self.script.lock().push_back(Scripted::Fail(error));
    }

    pub fn push_delayed(&self, delay: Duration, response: TransportResponse) {
        self.script.lock().push_back(Scripted::Delayed(delay, response));
    }

    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);
        let next = self.script.lock().pop_front();
        match next {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Ok(TransportResponse::empty(500)),
        }
    }
}

/// Token source returning a fixed token.
#[derive(Debug, Clone)]
pub struct StaticTokenSource(String);

impl StaticTokenSource {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl AccessTokenSource for StaticTokenSource {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// In-memory token storage with switchable failures.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    tokens: Mutex<Option<TokenPair>>,
    fail_writes: Mutex<bool>,
}

impl MemoryTokenStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(tokens: TokenPair) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
            fail_writes: Mutex::new(false),
        }
    }

    #[must_use]
    pub fn stored(&self) -> Option<TokenPair> {
        self.tokens.lock().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }
}

#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn load(&self) -> Result<Option<TokenPair>, StorageError> {
        Ok(self.tokens.lock().clone())
    }

    async fn save(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        if *self.fail_writes.lock() {
            return Err(StorageError::Serialization("disk full".into()));
        }
        *self.tokens.lock() = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self.tokens.lock() = None;
        Ok(())
    }
}

/// Call counts recorded by [`FakeAuthBackend`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackendCalls {
    pub login: u32,
    pub verify_mfa: u32,
    pub oauth: u32,
    pub refresh: u32,
    pub logout: u32,
    pub current_user: u32,
}

type Reply<T> = Box<dyn Fn() -> Result<T, ApiError> + Send + Sync>;

/// Scriptable auth backend. Each operation answers through a replaceable closure.
pub struct FakeAuthBackend {
    login: Mutex<Reply<LoginOutcome>>,
    verify_mfa: Mutex<Reply<AuthGrant>>,
    oauth: Mutex<Reply<AuthGrant>>,
    refresh: Mutex<Reply<TokenPair>>,
    logout: Mutex<Reply<()>>,
    current_user: Mutex<Reply<User>>,
    refresh_delay: Mutex<Duration>,
    calls: Mutex<BackendCalls>,
    last_credentials: Mutex<Option<Credentials>>,
    last_mfa_code: Mutex<Option<String>>,
}

impl FakeAuthBackend {
    /// Backend that rejects everything with an auth error.
    #[must_use]
    pub fn new() -> Self {
        Self {
            login: Mutex::new(Box::new(|| Err(ApiError::from_status(401, "invalid credentials")))),
            verify_mfa: Mutex::new(Box::new(|| Err(ApiError::from_status(401, "invalid code")))),
            oauth: Mutex::new(Box::new(|| Err(ApiError::from_status(401, "invalid code")))),
            refresh: Mutex::new(Box::new(|| Err(ApiError::from_status(401, "refresh rejected")))),
            logout: Mutex::new(Box::new(|| Ok(()))),
            current_user: Mutex::new(Box::new(|| Err(ApiError::from_status(401, "unknown token")))),
            refresh_delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(BackendCalls::default()),
            last_credentials: Mutex::new(None),
            last_mfa_code: Mutex::new(None),
        }
    }

    pub fn on_login(&self, reply: impl Fn() -> Result<LoginOutcome, ApiError> + Send + Sync + 'static) {
        *self.login.lock() = Box::new(reply);
    }

    pub fn on_verify_mfa(&self, reply: impl Fn() -> Result<AuthGrant, ApiError> + Send + Sync + 'static) {
        *self.verify_mfa.lock() = Box::new(reply);
    }

    pub fn on_oauth(&self, reply: impl Fn() -> Result<AuthGrant, ApiError> + Send + Sync + 'static) {
        *self.oauth.lock() = Box::new(reply);
    }

    pub fn on_refresh(&self, reply: impl Fn() -> Result<TokenPair, ApiError> + Send + Sync + 'static) {
        *self.refresh.lock() = Box::new(reply);
    }

    pub fn on_logout(&self, reply: impl Fn() -> Result<(), ApiError> + Send + Sync + 'static) {
        *self.logout.lock() = Box::new(reply);
    }

    pub fn on_current_user(&self, reply: impl Fn() -> Result<User, ApiError> + Send + Sync + 'static) {
        *self.current_user.lock() = Box::new(reply);
    }

    /// Makes refresh calls take `delay` before answering.
    pub fn delay_refresh(&self, delay: Duration) {
        *self.refresh_delay.lock() = delay;
    }

    /// Login succeeds with `grant`.
    pub fn grant_login(&self, grant: AuthGrant) {
        self.on_login(move || Ok(LoginOutcome::Authenticated(grant.clone())));
    }

    #[must_use]
    pub fn calls(&self) -> BackendCalls {
        *self.calls.lock()
    }

    #[must_use]
    pub fn last_mfa_code(&self) -> Option<String> {
        self.last_mfa_code.lock().clone()
    }

    #[must_use]
    pub fn last_credentials(&self) -> Option<Credentials> {
        self.last_credentials.lock().clone()
    }
}

impl Default for FakeAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthBackend for FakeAuthBackend {
    async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome, ApiError> {
        self.calls.lock().login += 1;
        *self.last_credentials.lock() = Some(credentials.clone());
        (*self.login.lock())()
    }

    async fn verify_mfa(&self, _challenge: &MfaChallenge, code: &str) -> Result<AuthGrant, ApiError> {
        self.calls.lock().verify_mfa += 1;
        *self.last_mfa_code.lock() = Some(code.to_string());
        (*self.verify_mfa.lock())()
    }

    async fn oauth_exchange(&self, _provider: &str, _code: &str) -> Result<AuthGrant, ApiError> {
        self.calls.lock().oauth += 1;
        (*self.oauth.lock())()
    }

    async fn refresh(&self, _tokens: &TokenPair) -> Result<TokenPair, ApiError> {
        self.calls.lock().refresh += 1;
        let delay = *self.refresh_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        (*self.refresh.lock())()
    }

    async fn logout(&self, _access_token: &str) -> Result<(), ApiError> {
        self.calls.lock().logout += 1;
        (*self.logout.lock())()
    }

    async fn current_user(&self, _access_token: &str) -> Result<User, ApiError> {
        self.calls.lock().current_user += 1;
        (*self.current_user.lock())()
    }
}

/// Push channel replaying scripted connections. Each `connect` takes the
/// next script; an empty script list fails the connection.
#[derive(Default)]
pub struct ScriptedPushChannel {
    connections: Mutex<VecDeque<Result<Vec<MonitorEvent>, MonitorError>>>,
    connects: AtomicU32,
}

impl ScriptedPushChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next connection succeeds, delivers `events` and then drops.
    pub fn push_connection(&self, events: Vec<MonitorEvent>) {
        self.connections.lock().push_back(Ok(events));
    }

    /// Next connection fails.
    pub fn push_failure(&self) {
        self.connections
            .lock()
            .push_back(Err(MonitorError::Connect("refused".into())));
    }

    #[must_use]
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushChannel for ScriptedPushChannel {
    async fn connect(&self) -> Result<EventStream, MonitorError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.connections.lock().pop_front();
        match next {
            Some(Ok(events)) => Ok(futures_util::stream::iter(events.into_iter().map(Ok)).boxed()),
            Some(Err(error)) => Err(error),
            None => Err(MonitorError::Connect("no scripted connection".into())),
        }
    }
}

/// Shared handles for a session manager under test.
pub struct SessionDoubles {
    pub backend: Arc<FakeAuthBackend>,
    pub storage: Arc<MemoryTokenStorage>,
}

impl SessionDoubles {
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: Arc::new(FakeAuthBackend::new()),
            storage: Arc::new(MemoryTokenStorage::new()),
        }
    }
}

impl Default for SessionDoubles {
    fn default() -> Self {
        Self::new()
    }
}
