//! AES-256-GCM sealing for the persisted token.
//!
//! Sealed values are `base64(nonce || ciphertext)` with a fresh 96-bit nonce
//! per write. The key is configured on the client, so this only keeps the
//! token out of casual view on disk.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cosmos_application::ports::StorageError;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Seals and opens stored values with one AES-256 key.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Builds a cipher from a base64-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Crypto`] if the key is not base64 or not 32 bytes.
    pub fn from_base64(key: &str) -> Result<Self, StorageError> {
        let bytes = STANDARD
            .decode(key.trim())
            .map_err(|e| StorageError::Crypto(format!("encryption key is not base64: {e}")))?;
        if bytes.len() != KEY_LEN {
            return Err(StorageError::Crypto(format!(
                "encryption key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypts `plaintext`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Crypto`] if encryption fails.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, StorageError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| StorageError::Crypto(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Decrypts a value produced by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Crypto`] if the value is malformed, was sealed
    /// with another key, or was tampered with.
    pub fn open(&self, sealed: &str) -> Result<Vec<u8>, StorageError> {
        let bytes = STANDARD
            .decode(sealed.trim())
            .map_err(|e| StorageError::Crypto(format!("sealed value is not base64: {e}")))?;
        if bytes.len() <= NONCE_LEN {
            return Err(StorageError::Crypto("sealed value is too short".to_string()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StorageError::Crypto("sealed value could not be opened".to_string()))
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher(***)")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(byte: u8) -> String {
        STANDARD.encode([byte; KEY_LEN])
    }

    #[test]
    fn test_seal_and_open() {
        let cipher = TokenCipher::from_base64(&key(7)).unwrap();
        let sealed = cipher.seal(b"access-token").unwrap();
        assert!(!sealed.contains("access-token"));
        assert_eq!(cipher.open(&sealed).unwrap(), b"access-token");
    }

    #[test]
    fn test_nonce_differs_per_seal() {
        let cipher = TokenCipher::from_base64(&key(7)).unwrap();
        assert_ne!(cipher.seal(b"same").unwrap(), cipher.seal(b"same").unwrap());
    }

    #[test]
    fn test_wrong_key_or_tampering_fails() {
        let cipher = TokenCipher::from_base64(&key(7)).unwrap();
        let other = TokenCipher::from_base64(&key(8)).unwrap();
        let sealed = cipher.seal(b"secret").unwrap();
        assert!(other.open(&sealed).is_err());

        let mut bytes = STANDARD.decode(&sealed).unwrap();
        if let Some(last) = bytes.last_mut() {
            *last ^= 0x01;
        }
        assert!(cipher.open(&STANDARD.encode(bytes)).is_err());
        assert!(cipher.open("AAAA").is_err());
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert!(TokenCipher::from_base64("not base64!").is_err());
        assert!(TokenCipher::from_base64(&STANDARD.encode([1u8; 16])).is_err());
    }
}
