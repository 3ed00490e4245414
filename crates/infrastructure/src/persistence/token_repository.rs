//! File-based token persistence.
//!
//! The token pair is stored as one value in `{directory}/{key}`:
//! - plain JSON when no encryption key is configured
//! - `base64(nonce || ciphertext)` of that JSON otherwise
//!
//! Without a configured directory the platform data dir is used:
//! - Linux: ~/.local/share/cosmos
//! - macOS: ~/Library/Application Support/cosmos
//! - Windows: %APPDATA%/cosmos

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cosmos_application::ports::{StorageError, TokenStorage};
use cosmos_domain::{StorageSettings, TokenPair};
use tokio::fs;
use tracing::debug;

use super::token_cipher::TokenCipher;

/// Token storage backed by a single file.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
    cipher: Option<TokenCipher>,
}

impl FileTokenStorage {
    /// Stores the pair unencrypted at `path`.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path, cipher: None }
    }

    /// Seals the stored value with `cipher`.
    #[must_use]
    pub fn with_cipher(mut self, cipher: TokenCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Builds the storage described by the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if no directory is configured and the platform has
    /// no data dir, or if the encryption key is invalid.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, StorageError> {
        let directory = match &settings.directory {
            Some(directory) => directory.clone(),
            None => Self::default_dir().ok_or_else(|| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "could not determine the data directory",
                ))
            })?,
        };
        let storage = Self::new(Self::token_path(&directory, &settings.key));
        match &settings.encryption_key {
            Some(key) => Ok(storage.with_cipher(TokenCipher::from_base64(key)?)),
            None => Ok(storage),
        }
    }

    /// Returns the default Cosmos data directory.
    fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("cosmos"))
    }

    /// Returns the file the value for `key` lives in.
    fn token_path(directory: &Path, key: &str) -> PathBuf {
        directory.join(format!("{key}.json"))
    }

    /// Location of the stored value.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(&self, tokens: &TokenPair) -> Result<Vec<u8>, StorageError> {
        let json =
            serde_json::to_vec(tokens).map_err(|e| StorageError::Serialization(e.to_string()))?;
        match &self.cipher {
            Some(cipher) => cipher.seal(&json).map(String::into_bytes),
            None => Ok(json),
        }
    }

    fn decode(&self, content: &[u8]) -> Result<TokenPair, StorageError> {
        let json = match &self.cipher {
            Some(cipher) => {
                let sealed = std::str::from_utf8(content)
                    .map_err(|e| StorageError::Crypto(format!("sealed value is not text: {e}")))?;
                cipher.open(sealed)?
            }
            None => content.to_vec(),
        };
        serde_json::from_slice(&json).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    async fn load(&self) -> Result<Option<TokenPair>, StorageError> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.decode(&content).map(Some)
    }

    async fn save(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = self.encode(tokens)?;

        // Replaced atomically through a sibling file.
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &self.path).await?;
        debug!(path = %self.path.display(), sealed = self.cipher.is_some(), "token persisted");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
