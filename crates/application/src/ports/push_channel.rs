//! Push channel port for live platform updates.

use async_trait::async_trait;
use cosmos_domain::MonitorEvent;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Push channel failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),
    /// A message could not be understood.
    #[error("invalid message: {0}")]
    Protocol(String),
    /// The channel is not configured.
    #[error("push channel not configured")]
    NotConfigured,
}

/// Stream of events from one connection. Ends when the connection drops.
pub type EventStream = BoxStream<'static, Result<MonitorEvent, MonitorError>>;

/// Port for connecting to the platform's push endpoint.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Opens a connection.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Connect`] if the handshake fails.
    async fn connect(&self) -> Result<EventStream, MonitorError>;
}
