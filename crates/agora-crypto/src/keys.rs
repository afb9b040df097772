use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::{CryptoError, Result};

/// A fresh random 256-bit key for one conversation.
pub fn generate_conversation_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

pub fn key_to_base64(key: &[u8; 32]) -> String {
    BASE64.encode(key)
}

pub fn key_from_base64(encoded: &str) -> Result<[u8; 32]> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| CryptoError::InvalidKey(format!("expected 32 bytes, got {}", b.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip() {
        let key = generate_conversation_key();
        assert_eq!(key_from_base64(&key_to_base64(&key)).unwrap(), key);
    }

    #[test]
    fn keys_differ() {
        assert_ne!(generate_conversation_key(), generate_conversation_key());
    }

    #[test]
    fn short_keys_are_rejected() {
        let err = key_from_base64(&BASE64.encode([1u8; 16])).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey(_)));
        assert!(key_from_base64("not base64!").is_err());
    }
}
