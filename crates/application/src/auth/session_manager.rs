//! Session manager.
//!
//! Owns the [`Session`]: runs the login, MFA and OAuth flows, keeps the
//! access token fresh, logs out idle users and publishes snapshots to
//! readers. Timers are tasks owned by the manager and hold only a weak
//! reference back to it, so dropping the last handle stops them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use cosmos_domain::auth::token_preview;
use cosmos_domain::{
    ApiError, AuthGrant, Credentials, ErrorKind, LoginOutcome, LogoutReason, MfaChallenge,
    Session, SessionPhase, SessionSettings, TokenPair,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::events::SessionEvent;
use super::rate_limiter::LoginRateLimiter;
use super::blacklist::TokenBlacklist;
use super::status::TokenStatus;
use crate::polling::TaskHandle;
use crate::ports::{AccessTokenSource, AuthBackend, Clock, TokenStorage};

const EVENT_CAPACITY: usize = 32;

/// Handle to the process's session. Clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn AuthBackend>,
    storage: Arc<dyn TokenStorage>,
    clock: Arc<dyn Clock>,
    limiter: Arc<LoginRateLimiter>,
    blacklist: TokenBlacklist,
    settings: SessionSettings,
    session: watch::Sender<Session>,
    events: broadcast::Sender<SessionEvent>,
    challenge: Mutex<Option<MfaChallenge>>,
    timers: Mutex<Timers>,
    // Held across every storage write so a clear always lands after any
    // save that started before it.
    persist: tokio::sync::Mutex<()>,
    // Bumped whenever a session starts or ends; timers and in-flight
    // refreshes from an older epoch discard their work.
    epoch: AtomicU64,
}

#[derive(Default)]
struct Timers {
    refresh: Option<TaskHandle>,
    idle: Option<TaskHandle>,
}

impl SessionManager {
    /// Creates a manager with no active session.
    #[must_use]
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        storage: Arc<dyn TokenStorage>,
        clock: Arc<dyn Clock>,
        limiter: Arc<LoginRateLimiter>,
        settings: SessionSettings,
    ) -> Self {
        let (session, _) = watch::channel(Session::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                backend,
                storage,
                blacklist: TokenBlacklist::new(Arc::clone(&clock)),
                clock,
                limiter,
                settings,
                session,
                events,
                challenge: Mutex::new(None),
                timers: Mutex::new(Timers::default()),
                persist: tokio::sync::Mutex::new(()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Current session snapshot.
    #[must_use]
    pub fn session(&self) -> Session {
        self.inner.session.borrow().clone()
    }

    /// Current state machine phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.inner.session.borrow().phase()
    }

    /// Receiver of session snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.session.subscribe()
    }

    /// Receiver of lifecycle events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Settings in effect.
    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    /// Logs in with email and password.
    ///
    /// Returns [`SessionPhase::MfaPending`] when the backend asks for a
    /// second factor; no tokens are stored until [`Self::verify_mfa`] succeeds.
    ///
    /// # Errors
    ///
    /// Validation errors for missing fields, `RateLimited` when the
    /// identifier has too many recent failures, otherwise the backend's error.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionPhase, ApiError> {
        credentials.validate()?;
        let key = credentials.rate_limit_key();
        self.inner.limiter.check(&key)?;

        match self.inner.backend.login(credentials).await {
            Ok(LoginOutcome::Authenticated(grant)) => {
                self.inner.limiter.reset(&key);
                let now = self.inner.clock.now();
                self.establish(grant, now).await?;
                Ok(SessionPhase::Authenticated)
            }
            Ok(LoginOutcome::MfaRequired(challenge)) => {
                self.begin_mfa(challenge).await;
                Ok(SessionPhase::MfaPending)
            }
            Err(error) => {
                if is_rejection(&error) {
                    self.inner.limiter.record_failure(&key);
                }
                warn!(kind = %error.kind, "login failed");
                Err(error)
            }
        }
    }

    /// Completes a login with the second-factor code.
    ///
    /// # Errors
    ///
    /// `Validation` if the code has the wrong length or is not numeric,
    /// `Auth` if no challenge is pending, otherwise the backend's error.
    pub async fn verify_mfa(&self, code: &str) -> Result<(), ApiError> {
        let expected = self.inner.settings.mfa_code_length;
        if code.len() != expected || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ApiError::validation(format!(
                "verification code must be {expected} digits"
            )));
        }
        let challenge = self
            .inner
            .challenge
            .lock()
            .clone()
            .ok_or_else(|| ApiError::auth("no verification is pending"))?;
        let key = challenge.email.trim().to_lowercase();
        self.inner.limiter.check(&key)?;

        match self.inner.backend.verify_mfa(&challenge, code).await {
            Ok(grant) => {
                self.inner.limiter.reset(&key);
                let now = self.inner.clock.now();
                self.establish(grant, now).await
            }
            Err(error) => {
                if is_rejection(&error) {
                    self.inner.limiter.record_failure(&key);
                }
                warn!(kind = %error.kind, "verification failed");
                Err(error)
            }
        }
    }

    /// Completes an OAuth login with the provider's authorization code.
    ///
    /// # Errors
    ///
    /// `Config` if the provider is not allowed, `Validation` for an empty
    /// code, `RateLimited` after repeated failures, otherwise the backend's error.
    pub async fn oauth_login(&self, provider: &str, code: &str) -> Result<(), ApiError> {
        if !self.inner.settings.allows_provider(provider) {
            return Err(ApiError::config(format!(
                "OAuth provider '{provider}' is not enabled"
            )));
        }
        if code.trim().is_empty() {
            return Err(ApiError::validation("authorization code must not be empty"));
        }
        let provider = provider.to_lowercase();
        let key = format!("oauth:{provider}");
        self.inner.limiter.check(&key)?;

        match self.inner.backend.oauth_exchange(&provider, code).await {
            Ok(grant) => {
                self.inner.limiter.reset(&key);
                let now = self.inner.clock.now();
                self.establish(grant, now).await
            }
            Err(error) => {
                if is_rejection(&error) {
                    self.inner.limiter.record_failure(&key);
                }
                warn!(provider = %provider, kind = %error.kind, "OAuth login failed");
                Err(error)
            }
        }
    }

    /// Ends the session. Local state is cleared before the server is told,
    /// and stays cleared whatever the server answers.
    pub async fn logout(&self) {
        self.end_session(LogoutReason::UserRequested, true).await;
    }

    /// Marks user activity, postponing the idle timeout.
    pub fn record_activity(&self) {
        let now = self.inner.clock.now();
        self.inner.session.send_if_modified(|session| {
            if session.authenticated {
                session.last_activity = Some(now);
                true
            } else {
                false
            }
        });
    }

    /// Resumes a persisted session. Returns whether a session is now active.
    ///
    /// Expired tokens are refreshed when possible; tokens the server rejects
    /// are discarded.
    ///
    /// # Errors
    ///
    /// Returns transient errors (network, server) so the caller can retry
    /// later; the stored tokens are kept in that case.
    pub async fn restore(&self) -> Result<bool, ApiError> {
        let stored = match self.inner.storage.load().await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => return Ok(false),
            Err(error) => {
                warn!(%error, "stored session is unreadable, discarding");
                self.discard_stored().await;
                return Ok(false);
            }
        };

        let now = self.inner.clock.now();
        if self.inner.blacklist.contains(&stored.access_token) {
            self.discard_stored().await;
            return Ok(false);
        }
        let tokens = if stored.is_expired_or_expiring(now, Duration::zero()) {
            if !stored.can_refresh() {
                info!("stored session expired");
                self.discard_stored().await;
                return Ok(false);
            }
            match self.inner.backend.refresh(&stored).await {
                Ok(fresh) => merge_refresh(&stored, fresh),
                Err(error) if error.kind.is_transient() => return Err(error),
                Err(error) => {
                    info!(%error, "stored session could not be renewed");
                    self.discard_stored().await;
                    return Ok(false);
                }
            }
        } else {
            stored
        };

        match self.inner.backend.current_user(&tokens.access_token).await {
            Ok(user) => {
                let issued_at = tokens
                    .claims()
                    .and_then(|claims| claims.issued_at())
                    .filter(|at| *at <= now)
                    .unwrap_or(now);
                self.establish(AuthGrant { tokens, user }, issued_at).await?;
                Ok(true)
            }
            Err(error) if error.kind.is_transient() => Err(error),
            Err(error) => {
                info!(%error, "stored session rejected");
                self.discard_stored().await;
                let _ = self.inner.events.send(SessionEvent::LoggedOut {
                    reason: LogoutReason::RestoreFailed,
                });
                Ok(false)
            }
        }
    }

    /// Returns true only for the current session's unexpired, unrevoked token.
    #[must_use]
    pub fn validate_token(&self, token: &str) -> bool {
        if token.is_empty() || self.inner.blacklist.contains(token) {
            return false;
        }
        let now = self.inner.clock.now();
        let session = self.inner.session.borrow();
        session.authenticated
            && session.access_token.as_deref() == Some(token)
            && session.expires_at.is_none_or(|expiry| now < expiry)
    }

    /// Bearer token for outgoing requests.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        let session = self.inner.session.borrow();
        session
            .access_token
            .as_ref()
            .filter(|_| session.authenticated)
            .filter(|token| !self.inner.blacklist.contains(token))
            .cloned()
    }

    /// Checks that the signed-in user holds `permission`.
    ///
    /// # Errors
    ///
    /// `Auth` when nobody is signed in, `Permission` when the user lacks it.
    pub fn require_permission(&self, permission: &str) -> Result<(), ApiError> {
        let session = self.inner.session.borrow();
        let user = session
            .user
            .as_ref()
            .filter(|_| session.authenticated)
            .ok_or_else(|| ApiError::auth("not signed in"))?;
        if user.has_permission(permission) {
            Ok(())
        } else {
            Err(ApiError::permission(format!("missing permission '{permission}'")))
        }
    }

    /// When the running refresh timer will renew the token.
    #[must_use]
    pub fn refresh_deadline(&self) -> Option<DateTime<Utc>> {
        if self.inner.timers.lock().refresh.is_none() {
            return None;
        }
        refresh_due_at(&self.inner.session.borrow(), &self.inner.settings)
    }

    /// Token status for display.
    #[must_use]
    pub fn token_status(&self) -> TokenStatus {
        TokenStatus::of(
            &self.inner.session.borrow(),
            self.inner.clock.now(),
            self.inner.settings.refresh_lead(),
        )
    }

    /// Stops the session timers without ending the session.
    pub fn shutdown(&self) {
        self.stop_timers();
        debug!("session timers stopped");
    }

    async fn establish(&self, grant: AuthGrant, issued_at: DateTime<Utc>) -> Result<(), ApiError> {
        let inner = &self.inner;
        if inner.blacklist.contains(&grant.tokens.access_token) {
            warn!("refusing a revoked token");
            return Err(ApiError::auth("issued token has been revoked"));
        }
        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.stop_timers();
        if !self.persist(&grant.tokens, epoch).await {
            debug!("session ended while signing in, discarding grant");
            return Err(ApiError::auth("session ended while signing in"));
        }

        let now = inner.clock.now();
        let user_id = grant.user.id.clone();
        let email = grant.user.email.clone();
        let mut session = Session::authenticated(grant.user, &grant.tokens, now);
        session.issued_at = Some(issued_at);

        let Some(previous) = self.publish_if_current(epoch, |current| {
            std::mem::replace(current, session)
        }) else {
            debug!("session ended while signing in, discarding grant");
            return Err(ApiError::auth("session ended while signing in"));
        };
        *inner.challenge.lock() = None;
        if let Some(old) = previous
            .access_token
            .filter(|token| *token != grant.tokens.access_token)
        {
            inner.blacklist.add(old, previous.expires_at);
        }
        self.start_timers(epoch);

        info!(user_id = %user_id, "session established");
        let _ = inner.events.send(SessionEvent::LoggedIn { user_id, email });
        Ok(())
    }

    async fn begin_mfa(&self, challenge: MfaChallenge) {
        if self.inner.session.borrow().authenticated {
            self.end_session(LogoutReason::UserRequested, false).await;
        }
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let email = challenge.email.clone();
        *self.inner.challenge.lock() = Some(challenge);
        self.inner.session.send_replace(Session::mfa_pending());
        info!("second factor required");
        let _ = self.inner.events.send(SessionEvent::MfaRequired { email });
    }

    async fn end_session(&self, reason: LogoutReason, notify_server: bool) {
        let inner = &self.inner;
        inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.stop_timers();
        *inner.challenge.lock() = None;
        let previous = inner.session.send_replace(Session::default());
        if let Some(token) = &previous.access_token {
            inner.blacklist.add(token.clone(), previous.expires_at);
        }
        self.discard_stored().await;
        if previous.authenticated || previous.mfa_pending {
            info!(?reason, "session ended");
            let _ = inner.events.send(SessionEvent::LoggedOut { reason });
        }
        if notify_server
            && let Some(token) = previous.access_token
            && let Err(error) = inner.backend.logout(&token).await
        {
            warn!(%error, "server-side logout failed, local session already cleared");
        }
    }

    async fn discard_stored(&self) {
        let _guard = self.inner.persist.lock().await;
        if let Err(error) = self.inner.storage.clear().await {
            warn!(%error, "could not clear persisted tokens");
        }
    }

    /// Saves `tokens` unless the session moved past `epoch` first. Returns
    /// false when the write was skipped.
    async fn persist(&self, tokens: &TokenPair, epoch: u64) -> bool {
        let _guard = self.inner.persist.lock().await;
        if self.current_epoch() != epoch {
            return false;
        }
        if let Err(error) = self.inner.storage.save(tokens).await {
            warn!(%error, "could not persist tokens, session will not survive a restart");
        }
        true
    }

    /// Applies `update` to the published session only while `epoch` is
    /// current. The check runs under the channel's lock, so a concurrent
    /// logout either sees the update or overwrites it.
    fn publish_if_current<R>(&self, epoch: u64, update: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut result = None;
        self.inner.session.send_if_modified(|session| {
            if self.current_epoch() != epoch {
                return false;
            }
            result = Some(update(session));
            true
        });
        result
    }

    fn current_epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    fn start_timers(&self, epoch: u64) {
        let refresh = spawn_refresh(Arc::downgrade(&self.inner), epoch);
        let interval = self
            .inner
            .settings
            .idle_check_interval()
            .max(StdDuration::from_secs(1));
        let idle = spawn_idle_watch(Arc::downgrade(&self.inner), epoch, interval);
        let mut timers = self.inner.timers.lock();
        timers.refresh = Some(refresh);
        timers.idle = Some(idle);
    }

    fn stop_timers(&self) {
        let stale = std::mem::take(&mut *self.inner.timers.lock());
        for handle in [stale.refresh, stale.idle].into_iter().flatten() {
            handle.stop();
        }
    }

    /// Time to wait before the next refresh check, or `None` to stop.
    fn next_refresh_wait(&self, epoch: u64) -> Option<StdDuration> {
        if self.current_epoch() != epoch {
            return None;
        }
        let due = refresh_due_at(&self.inner.session.borrow(), &self.inner.settings)?;
        debug!(%due, "token refresh scheduled");
        Some((due - self.inner.clock.now()).to_std().unwrap_or(StdDuration::ZERO))
    }

    /// Refreshes if due. Returns whether the refresh timer should keep running.
    async fn refresh_if_due(&self, epoch: u64) -> bool {
        let now = self.inner.clock.now();
        let current = {
            let session = self.inner.session.borrow();
            if self.current_epoch() != epoch {
                return false;
            }
            match refresh_due_at(&session, &self.inner.settings) {
                Some(due) if due <= now => session.token_pair(),
                Some(_) => return true,
                None => return false,
            }
        };
        match current {
            Some(current) => self.refresh_tokens(current, epoch).await,
            None => false,
        }
    }

    async fn refresh_tokens(&self, current: TokenPair, epoch: u64) -> bool {
        debug!("refreshing access token");
        let result = self.inner.backend.refresh(&current).await;
        if self.current_epoch() != epoch || self.inner.blacklist.contains(&current.access_token) {
            debug!("session ended during refresh, discarding result");
            return false;
        }

        let fresh = match result {
            Ok(fresh) if !self.inner.blacklist.contains(&fresh.access_token) => fresh,
            Ok(_) => {
                warn!("refresh returned a revoked token, ending session");
                self.end_session(LogoutReason::RefreshFailed, false).await;
                return false;
            }
            Err(error) => {
                warn!(%error, "token refresh failed, ending session");
                self.end_session(LogoutReason::RefreshFailed, false).await;
                return false;
            }
        };

        let merged = merge_refresh(&current, fresh);
        let now = self.inner.clock.now();
        if !self.persist(&merged, epoch).await
            || self
                .publish_if_current(epoch, |session| session.apply_refresh(&merged, now))
                .is_none()
        {
            debug!("session ended during refresh, discarding result");
            return false;
        }
        self.inner
            .blacklist
            .add(current.access_token.clone(), current.expiry());

        let expires_at = merged.expiry();
        info!(expires_at = ?expires_at, "access token refreshed");
        let _ = self.inner.events.send(SessionEvent::TokenRefreshed {
            token_preview: token_preview(&merged.access_token),
            expires_at,
        });
        true
    }

    /// Logs out if idle too long. Returns whether the watcher should keep running.
    async fn check_idle(&self, epoch: u64) -> bool {
        let now = self.inner.clock.now();
        let idle = {
            let session = self.inner.session.borrow();
            if self.current_epoch() != epoch || !session.authenticated {
                return false;
            }
            session.idle_for(now)
        };
        if idle.is_some_and(|idle| idle >= self.inner.settings.idle_timeout()) {
            info!("idle timeout reached");
            self.end_session(LogoutReason::IdleTimeout, true).await;
            return false;
        }
        true
    }

    fn upgrade(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }
}

impl AccessTokenSource for SessionManager {
    fn access_token(&self) -> Option<String> {
        Self::access_token(self)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("session", &*self.inner.session.borrow())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

fn spawn_refresh(inner: Weak<Inner>, epoch: u64) -> TaskHandle {
    TaskHandle::spawn(move |cancel| async move {
        loop {
            let Some(wait) =
                SessionManager::upgrade(&inner).and_then(|manager| manager.next_refresh_wait(epoch))
            else {
                break;
            };
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
            let Some(manager) = SessionManager::upgrade(&inner) else {
                break;
            };
            if !manager.refresh_if_due(epoch).await {
                break;
            }
        }
    })
}

fn spawn_idle_watch(inner: Weak<Inner>, epoch: u64, interval: StdDuration) -> TaskHandle {
    TaskHandle::spawn(move |cancel| async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
            let Some(manager) = SessionManager::upgrade(&inner) else {
                break;
            };
            if !manager.check_idle(epoch).await {
                break;
            }
        }
    })
}

/// A sign-in the server answered with a 4xx refusal. Outages, open
/// breakers and requests that never left the client do not count.
fn is_rejection(error: &ApiError) -> bool {
    error
        .status
        .is_some_and(|status| (400..500).contains(&status) && status != 408 && status != 429)
}

/// Keeps the previous refresh token when the server does not rotate it.
fn merge_refresh(current: &TokenPair, mut fresh: TokenPair) -> TokenPair {
    if fresh.refresh_token.is_none() {
        fresh.refresh_token.clone_from(&current.refresh_token);
    }
    fresh
}

/// When an authenticated session's token should be renewed: before expiry
/// by the refresh lead (at most half the token's lifetime), or once it
/// reaches the rotation age, whichever comes first.
#[must_use]
pub fn refresh_due_at(session: &Session, settings: &SessionSettings) -> Option<DateTime<Utc>> {
    if !session.authenticated {
        return None;
    }
    let issued = session.issued_at?;
    let expiry = session
        .expires_at
        .unwrap_or_else(|| after(issued, settings.default_token_lifetime()));
    let lifetime = expiry - issued;
    let by_expiry = if lifetime <= Duration::zero() {
        issued
    } else {
        expiry - settings.refresh_lead().min(lifetime / 2)
    };
    Some(by_expiry.min(after(issued, settings.rotation_age())))
}

fn after(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
