//! Token storage port
//!
//! Defines the interface for persisting the session's token pair.

use async_trait::async_trait;
use cosmos_domain::TokenPair;

/// Errors that can occur during token persistence.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Sealing or opening the stored value failed.
    #[error("Encryption error: {0}")]
    Crypto(String),
}

/// Repository trait for the persisted token pair.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Loads the stored pair. Returns `None` if nothing is stored.
    async fn load(&self) -> Result<Option<TokenPair>, StorageError>;

    /// Replaces the stored pair.
    ///
    /// # Errors
    /// Returns an error if the value cannot be written.
    async fn save(&self, tokens: &TokenPair) -> Result<(), StorageError>;

    /// Removes the stored pair. Clearing an empty store succeeds.
    async fn clear(&self) -> Result<(), StorageError>;
}
