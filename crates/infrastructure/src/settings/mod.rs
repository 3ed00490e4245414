//! Settings loading.

mod loader;

pub use loader::{ConfigError, ENV_PREFIX, SettingsLoader};
