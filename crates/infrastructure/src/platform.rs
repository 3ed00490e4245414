//! Composition root.
//!
//! Builds the breaker, rate limiter, session manager, executor, services,
//! store and monitor once and wires them together. Everything stateful is
//! created here and injected, so one platform means one breaker and one
//! rate-limit table.

use std::sync::Arc;

use cosmos_application::ports::{
    AccessTokenSource, Clock, HttpTransport, PushChannel, StorageError, TokenStorage,
    TransportError,
};
use cosmos_application::store::{bind_monitor, bind_session};
use cosmos_application::{
    CircuitBreaker, DatasetService, Effects, GenerationService, LoginRateLimiter, ModelService,
    Monitor, RequestExecutor, RetryPolicy, SafetyService, SessionManager, Store, TaskHandle,
    TrainingService,
};
use cosmos_domain::{BreakerPolicy, DomainError, PlatformSettings};
use tracing::info;

use crate::adapters::{ReqwestTransport, SystemClock};
use crate::auth::HttpAuthBackend;
use crate::monitor::WebSocketChannel;
use crate::persistence::FileTokenStorage;

/// Errors raised while assembling the platform.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Settings failed validation.
    #[error("Invalid settings: {0}")]
    Settings(#[from] DomainError),

    /// The HTTP client could not be created.
    #[error("HTTP transport unavailable: {0}")]
    Transport(#[from] TransportError),

    /// Token storage could not be prepared.
    #[error("Token storage unavailable: {0}")]
    Storage(#[from] StorageError),
}

/// Adapters the platform runs on.
pub struct Adapters {
    /// HTTP transport.
    pub transport: Arc<dyn HttpTransport>,
    /// Persisted token storage.
    pub storage: Arc<dyn TokenStorage>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Push channel. Defaults to a WebSocket for `monitor.ws_url`.
    pub push: Option<Arc<dyn PushChannel>>,
}

/// A fully wired client.
pub struct CosmosPlatform {
    settings: PlatformSettings,
    executor: RequestExecutor,
    session: SessionManager,
    store: Store,
    effects: Effects,
    monitor: Monitor,
}

/// Background tasks started by [`CosmosPlatform::start`].
#[must_use = "dropping the handles stops the background tasks"]
pub struct Running {
    handles: Vec<TaskHandle>,
}

impl Running {
    /// Number of live background tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if nothing was started.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl CosmosPlatform {
    /// Builds the platform on the production adapters: reqwest, the file
    /// token store and the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or an adapter cannot be
    /// created.
    pub fn new(settings: PlatformSettings) -> Result<Self, PlatformError> {
        let adapters = Adapters {
            transport: Arc::new(ReqwestTransport::new(&settings.api)?),
            storage: Arc::new(FileTokenStorage::from_settings(&settings.storage)?),
            clock: Arc::new(SystemClock::new()),
            push: None,
        };
        Self::with_adapters(settings, adapters)
    }

    /// Builds the platform on the given adapters.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid.
    pub fn with_adapters(settings: PlatformSettings, adapters: Adapters) -> Result<Self, PlatformError> {
        settings.validate()?;
        let Adapters {
            transport,
            storage,
            clock,
            push,
        } = adapters;

        let breaker = Arc::new(CircuitBreaker::new(
            BreakerPolicy::from(&settings.resilience),
            Arc::clone(&clock),
        ));
        let base = RequestExecutor::new(
            transport,
            breaker,
            RetryPolicy::from(&settings.resilience),
            Arc::clone(&clock),
            settings.api.base_url()?,
            settings.api.request_timeout(),
        );

        let backend = Arc::new(HttpAuthBackend::new(base.clone(), Arc::clone(&clock)));
        let limiter = Arc::new(LoginRateLimiter::from_settings(&settings.session, Arc::clone(&clock)));
        let session = SessionManager::new(backend, storage, clock, limiter, settings.session.clone());

        let tokens: Arc<dyn AccessTokenSource> = Arc::new(session.clone());
        let executor = base.with_token_source(Arc::clone(&tokens));

        let store = Store::new();
        let effects = Effects::new(
            store.clone(),
            session.clone(),
            DatasetService::new(executor.clone()),
            ModelService::new(executor.clone()),
            TrainingService::new(executor.clone()),
            SafetyService::new(executor.clone()),
            GenerationService::new(executor.clone()),
        );

        let push: Arc<dyn PushChannel> = match push {
            Some(push) => push,
            None => Arc::new(WebSocketChannel::new(&settings.monitor).with_token_source(tokens)),
        };
        let monitor = Monitor::new(push, settings.monitor.clone());

        Ok(Self {
            settings,
            executor,
            session,
            store,
            effects,
            monitor,
        })
    }

    /// Effective settings.
    #[must_use]
    pub const fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    /// Session manager.
    #[must_use]
    pub const fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Application state.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Service calls that keep the store in sync.
    #[must_use]
    pub const fn effects(&self) -> &Effects {
        &self.effects
    }

    /// Push-update monitor.
    #[must_use]
    pub const fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Executor carrying the session's token.
    #[must_use]
    pub const fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Training service, for job watches.
    #[must_use]
    pub fn training(&self) -> TrainingService {
        TrainingService::new(self.executor.clone())
    }

    /// Generation service, for request tracking.
    #[must_use]
    pub fn generation(&self) -> GenerationService {
        GenerationService::new(self.executor.clone())
    }

    /// Mirrors the session into the store and, when a push endpoint is
    /// configured, starts the monitor.
    pub fn start(&self) -> Running {
        let mut handles = vec![bind_session(&self.store, &self.session)];
        if self.settings.monitor.ws_url.is_some() {
            handles.push(bind_monitor(&self.store, &self.monitor));
            handles.push(self.monitor.start());
        } else {
            info!("push updates disabled, no monitor.ws_url configured");
        }
        Running { handles }
    }

    /// Stops background tasks and session timers. The persisted session is
    /// kept so the next start can restore it.
    pub async fn shutdown(&self, running: Running) {
        for handle in &running.handles {
            handle.stop();
        }
        for handle in running.handles {
            handle.finished().await;
        }
        self.session.shutdown();
        info!("platform stopped");
    }
}

impl std::fmt::Debug for CosmosPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosPlatform")
            .field("base_url", &self.settings.api.base_url)
            .field("session", &self.session.phase())
            .field("connection", &self.monitor.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cosmos_application::test_support::{
        ManualClock, MemoryTokenStorage, ScriptedPushChannel, ScriptedTransport, TEST_BASE_URL,
    };
    use cosmos_application::store::selectors;
    use cosmos_domain::{ConnectionState, Credentials, SessionPhase};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn settings(ws: bool) -> PlatformSettings {
        let mut settings = PlatformSettings::default();
        settings.api.base_url = TEST_BASE_URL.to_string();
        if ws {
            settings.monitor.ws_url = Some("wss://cosmos.example.com/ws".into());
        }
        settings
    }

    fn platform(
        settings: PlatformSettings,
        transport: &Arc<ScriptedTransport>,
        push: &Arc<ScriptedPushChannel>,
    ) -> CosmosPlatform {
        CosmosPlatform::with_adapters(
            settings,
            Adapters {
                transport: transport.clone(),
                storage: Arc::new(MemoryTokenStorage::new()),
                clock: Arc::new(ManualClock::default()),
                push: Some(push.clone()),
            },
        )
        .unwrap()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let mut bad = settings(false);
        bad.api.base_url = "not a url".into();
        let result = CosmosPlatform::with_adapters(
            bad,
            Adapters {
                transport: Arc::new(ScriptedTransport::new()),
                storage: Arc::new(MemoryTokenStorage::new()),
                clock: Arc::new(ManualClock::default()),
                push: None,
            },
        );
        assert!(matches!(result, Err(PlatformError::Settings(_))));
    }

    #[tokio::test]
    async fn test_login_token_reaches_service_requests() {
        let transport = Arc::new(ScriptedTransport::new());
        let push = Arc::new(ScriptedPushChannel::new());
        let platform = platform(settings(false), &transport, &push);
        let running = platform.start();
        assert_eq!(running.len(), 1);

        transport.push_json(
            200,
            json!({
                "user": {"id": "u-1", "email": "ada@example.com", "role": "ADMIN"},
                "token": "access-1",
                "refreshToken": "refresh-1",
                "expiresIn": 3600
            }),
        );
        transport.push_json(200, json!([]));

        let phase = platform
            .effects()
            .login(&Credentials::new("ada@example.com", "pw"))
            .await
            .unwrap();
        assert_eq!(phase, SessionPhase::Authenticated);

        let models = platform.effects().load_models(None).await;
        assert!(models.is_success());

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].header("authorization"), None);
        assert_eq!(requests[1].header("authorization"), Some("Bearer access-1"));

        settle().await;
        assert!(platform.store().select(selectors::is_authenticated));

        platform.shutdown(running).await;
    }

    #[tokio::test]
    async fn test_monitor_started_only_with_ws_url() {
        let transport = Arc::new(ScriptedTransport::new());
        let push = Arc::new(ScriptedPushChannel::new());
        push.push_connection(Vec::new());
        let platform = platform(settings(true), &transport, &push);

        let running = platform.start();
        assert_eq!(running.len(), 3);
        settle().await;
        assert!(push.connects() >= 1);

        platform.shutdown(running).await;
        assert_eq!(platform.monitor().state(), ConnectionState::Disconnected);
    }
}
