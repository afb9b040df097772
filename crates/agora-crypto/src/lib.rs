//! Encryption at rest for chat messages.
//!
//! Every conversation owns a random AES-256-GCM key, stored base64-encoded on
//! its row. Message text is sealed with that key before it reaches the
//! database and opened again when it is read back.

pub mod encrypt;
pub mod keys;

use thiserror::Error;

pub use encrypt::{decrypt_message, encrypt_message, open_or_raw, seal};
pub use keys::{generate_conversation_key, key_from_base64, key_to_base64};

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    #[error("encryption failed")]
    Encrypt,

    /// Wrong key or tampered ciphertext.
    #[error("decryption failed")]
    Decrypt,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
