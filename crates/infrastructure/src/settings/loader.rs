//! Layered settings loading.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults (every `PlatformSettings` field has one)
//! 2. an optional configuration file (TOML, JSON or YAML by extension)
//! 3. environment variables prefixed `COSMOS__`, sections separated by `__`,
//!    e.g. `COSMOS__API__BASE_URL` or `COSMOS__SESSION__IDLE_TIMEOUT_SECS`
//!
//! List values such as `COSMOS__SESSION__OAUTH_PROVIDERS` are comma separated.

use std::collections::HashMap;
use std::path::PathBuf;

use config::{Config, Environment, File};
use cosmos_domain::{DomainError, PlatformSettings};
use tracing::debug;

/// Prefix of the environment variables read by the loader.
pub const ENV_PREFIX: &str = "COSMOS";

const ENV_SEPARATOR: &str = "__";

/// Keys parsed as comma-separated lists when read from the environment.
const LIST_KEYS: &[&str] = &["session.oauth_providers", "resilience.retryable_statuses"];

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    /// A source could not be read or did not match the settings shape.
    #[error("Could not load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The merged settings violate a constraint.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] DomainError),
}

/// Builds [`PlatformSettings`] from defaults, a file and the environment.
#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
}

impl SettingsLoader {
    /// Creates a loader reading only defaults and the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a configuration file. A missing file is an error.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Reads variables from `vars` instead of the process environment.
    #[must_use]
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    /// Merges all sources and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed, a value has the
    /// wrong type, or the merged settings fail validation.
    pub fn load(&self) -> Result<PlatformSettings, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.clone()));
            }
            debug!(path = %path.display(), "reading configuration file");
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        let mut environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(",")
            .source(self.env.clone());
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }
        builder = builder.add_source(environment);

        let settings: PlatformSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }
}
