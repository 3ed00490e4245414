//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the application core and external systems.
//! Each port is a trait that can be implemented by adapters in the infrastructure layer.

mod auth_backend;
mod clock;
mod http_transport;
mod push_channel;
mod token_storage;

pub use auth_backend::{AccessTokenSource, AuthBackend};
pub use clock::Clock;
pub use http_transport::{HttpTransport, TransportError, TransportRequest, TransportResponse};
pub use push_channel::{EventStream, MonitorError, PushChannel};
pub use token_storage::{StorageError, TokenStorage};
