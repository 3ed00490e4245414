//! Cosmos Infrastructure - Adapters and implementations
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer, the layered settings loader,
//! and the composition root that wires a complete client.

pub mod adapters;
pub mod auth;
pub mod monitor;
pub mod persistence;
pub mod platform;
pub mod settings;

pub use adapters::{ReqwestTransport, SystemClock};
pub use auth::HttpAuthBackend;
pub use monitor::WebSocketChannel;
pub use persistence::{FileTokenStorage, TokenCipher};
pub use platform::{Adapters, CosmosPlatform, PlatformError, Running};
pub use settings::{ConfigError, SettingsLoader};
