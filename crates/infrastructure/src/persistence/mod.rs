//! Token persistence.

mod token_cipher;
mod token_repository;

pub use token_cipher::TokenCipher;
pub use token_repository::FileTokenStorage;
