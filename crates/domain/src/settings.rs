//! Client settings.
//!
//! Every field has a default so a partial configuration file (or none at
//! all) yields a usable client.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DomainError, DomainResult};

/// Top-level client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlatformSettings {
    /// HTTP API settings.
    pub api: ApiSettings,
    /// Session and login settings.
    pub session: SessionSettings,
    /// Circuit breaker and retry settings.
    pub resilience: ResilienceSettings,
    /// Push-update and polling settings.
    pub monitor: MonitorSettings,
    /// Token persistence settings.
    pub storage: StorageSettings,
}

impl PlatformSettings {
    /// Checks cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> DomainResult<()> {
        self.api.base_url()?;
        if self.session.mfa_code_length == 0 {
            return Err(DomainError::invalid("session.mfa_code_length", "must be positive"));
        }
        if self.session.max_login_attempts == 0 {
            return Err(DomainError::invalid("session.max_login_attempts", "must be positive"));
        }
        if self.resilience.failure_threshold == 0 {
            return Err(DomainError::invalid("resilience.failure_threshold", "must be positive"));
        }
        if self.resilience.max_attempts == 0 {
            return Err(DomainError::invalid("resilience.max_attempts", "must be positive"));
        }
        if self.resilience.half_open_success_threshold == 0 {
            return Err(DomainError::invalid(
                "resilience.half_open_success_threshold",
                "must be positive",
            ));
        }
        if let Some(url) = &self.monitor.ws_url
            && !url.starts_with("ws://")
            && !url.starts_with("wss://")
        {
            return Err(DomainError::invalid("monitor.ws_url", "must start with ws:// or wss://"));
        }
        Ok(())
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL the `/api/v1` paths are appended to.
    pub base_url: String,
    /// Default overall budget per request, retries included.
    pub request_timeout_ms: u64,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 30_000,
            user_agent: format!("cosmos-wfm/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ApiSettings {
    /// Parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidUrl`] if the URL does not parse or is not http(s).
    pub fn base_url(&self) -> DomainResult<Url> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| DomainError::InvalidUrl(format!("{e}: {}", self.base_url)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(DomainError::InvalidUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        Ok(url)
    }

    /// Default request budget.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Session, login and token lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Inactivity after which the session is closed.
    pub idle_timeout_secs: u64,
    /// How often the idle watcher runs.
    pub idle_check_interval_secs: u64,
    /// How long before expiry the token is refreshed.
    pub refresh_lead_secs: u64,
    /// Tokens older than this are rotated even if not close to expiry.
    pub rotation_age_secs: u64,
    /// Assumed lifetime for tokens that carry no expiry.
    pub default_token_lifetime_secs: u64,
    /// Required length of MFA codes.
    pub mfa_code_length: usize,
    /// OAuth providers the client accepts.
    pub oauth_providers: Vec<String>,
    /// Failed logins allowed per identifier within the window.
    pub max_login_attempts: u32,
    /// Rolling window for the login attempt counter.
    pub login_window_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            idle_check_interval_secs: 60,
            refresh_lead_secs: 5 * 60,
            rotation_age_secs: 50 * 60,
            default_token_lifetime_secs: 60 * 60,
            mfa_code_length: 6,
            oauth_providers: vec![
                "google".to_string(),
                "github".to_string(),
                "microsoft".to_string(),
            ],
            max_login_attempts: 5,
            login_window_secs: 60,
        }
    }
}

impl SessionSettings {
    /// Idle threshold.
    #[must_use]
    pub fn idle_timeout(&self) -> chrono::Duration {
        seconds(self.idle_timeout_secs)
    }

    /// Idle watcher period.
    #[must_use]
    pub const fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_interval_secs)
    }

    /// Refresh lead time.
    #[must_use]
    pub fn refresh_lead(&self) -> chrono::Duration {
        seconds(self.refresh_lead_secs)
    }

    /// Rotation age threshold.
    #[must_use]
    pub fn rotation_age(&self) -> chrono::Duration {
        seconds(self.rotation_age_secs)
    }

    /// Fallback token lifetime.
    #[must_use]
    pub fn default_token_lifetime(&self) -> chrono::Duration {
        seconds(self.default_token_lifetime_secs)
    }

    /// Login attempt window.
    #[must_use]
    pub fn login_window(&self) -> chrono::Duration {
        seconds(self.login_window_secs)
    }

    /// Returns true if the provider is on the allow-list.
    #[must_use]
    pub fn allows_provider(&self, provider: &str) -> bool {
        self.oauth_providers
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(provider))
    }
}

/// Circuit breaker and retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Time the breaker stays open before admitting a probe.
    pub reset_timeout_secs: u64,
    /// Probe successes needed to close the breaker.
    pub half_open_success_threshold: u32,
    /// Network attempts per request, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_base_delay_ms: u64,
    /// Statuses considered transient.
    pub retryable_statuses: Vec<u16>,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 60,
            half_open_success_threshold: 3,
            max_attempts: 3,
            retry_base_delay_ms: 1_000,
            retryable_statuses: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl ResilienceSettings {
    /// Breaker open period.
    #[must_use]
    pub fn reset_timeout(&self) -> chrono::Duration {
        seconds(self.reset_timeout_secs)
    }

    /// First retry delay.
    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Push-update and polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// WebSocket endpoint for push updates. Disabled when unset.
    pub ws_url: Option<String>,
    /// Fixed wait between reconnect attempts.
    pub reconnect_interval_secs: u64,
    /// Reconnect attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Period of training/generation progress polls.
    pub poll_interval_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            ws_url: None,
            reconnect_interval_secs: 5,
            max_reconnect_attempts: 10,
            poll_interval_secs: 5,
        }
    }
}

impl MonitorSettings {
    /// Reconnect wait.
    #[must_use]
    pub const fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    /// Poll period.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Token persistence settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding persisted state. Uses the platform data dir when unset.
    pub directory: Option<PathBuf>,
    /// Name the token is stored under.
    pub key: String,
    /// Base64 AES-256 key. Tokens are stored in clear when unset.
    pub encryption_key: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            directory: None,
            key: "cosmos_auth_token".to_string(),
            encryption_key: None,
        }
    }
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("directory", &self.directory)
            .field("key", &self.key)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "***"))
            .finish()
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
