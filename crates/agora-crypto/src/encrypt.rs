use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tracing::warn;

use crate::keys::key_from_base64;
use crate::{CryptoError, Result};

const NONCE_LEN: usize = 12;

/// Encrypts with AES-256-GCM under a fresh random nonce.
/// Returns (ciphertext, nonce).
pub fn encrypt_message(key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    Ok((ciphertext, nonce_bytes.to_vec()))
}

pub fn decrypt_message(key: &[u8; 32], ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::Malformed(format!("nonce of {} bytes", nonce.len())));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// Encrypts `text` for storage: base64 of nonce followed by ciphertext.
pub fn seal(key_b64: &str, text: &str) -> Result<String> {
    let key = key_from_base64(key_b64)?;
    let (ciphertext, nonce) = encrypt_message(&key, text.as_bytes())?;
    let mut packed = nonce;
    packed.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(packed))
}

/// Reverses [`seal`].
pub fn open(key_b64: &str, stored: &str) -> Result<String> {
    let key = key_from_base64(key_b64)?;
    let packed = BASE64
        .decode(stored)
        .map_err(|e| CryptoError::Malformed(e.to_string()))?;
    if packed.len() <= NONCE_LEN {
        return Err(CryptoError::Malformed(format!("{} bytes", packed.len())));
    }
    let (nonce, ciphertext) = packed.split_at(NONCE_LEN);
    let plain = decrypt_message(&key, ciphertext, nonce)?;
    String::from_utf8(plain).map_err(|e| CryptoError::Malformed(e.to_string()))
}

/// Opens a stored message, handing back the stored value unchanged when it
/// cannot be decrypted (rows written before encryption, or a rotated key).
pub fn open_or_raw(key_b64: &str, stored: &str) -> String {
    match open(key_b64, stored) {
        Ok(text) => text,
        Err(e) => {
            warn!("Returning stored message text as-is: {}", e);
            stored.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_conversation_key, key_to_base64};

    fn key_b64() -> String {
        key_to_base64(&generate_conversation_key())
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = generate_conversation_key();
        let message = b"Rig 7 ready for inspection";

        let (ciphertext, nonce) = encrypt_message(&key, message).unwrap();
        assert_ne!(&ciphertext, message);

        let decrypted = decrypt_message(&key, &ciphertext, &nonce).unwrap();
        assert_eq!(decrypted, message);
    }

    #[test]
    fn wrong_key_fails() {
        let (ciphertext, nonce) = encrypt_message(&generate_conversation_key(), b"secret").unwrap();
        let result = decrypt_message(&generate_conversation_key(), &ciphertext, &nonce);
        assert!(matches!(result, Err(CryptoError::Decrypt)));
    }

    #[test]
    fn bad_nonce_is_an_error_not_a_panic() {
        let key = generate_conversation_key();
        assert!(matches!(
            decrypt_message(&key, b"xx", b"short"),
            Err(CryptoError::Malformed(_))
        ));
    }

    #[test]
    fn sealed_text_differs_and_opens() {
        let key = key_b64();
        let sealed = seal(&key, "hello").unwrap();
        assert_ne!(sealed, "hello");
        assert_ne!(sealed, seal(&key, "hello").unwrap());
        assert_eq!(open(&key, &sealed).unwrap(), "hello");
        assert_eq!(open_or_raw(&key, &sealed), "hello");
    }

    #[test]
    fn foreign_key_or_garbage_falls_back() {
        let sealed = seal(&key_b64(), "hello").unwrap();
        assert_eq!(open_or_raw(&key_b64(), &sealed), sealed);
        assert_eq!(open_or_raw(&key_b64(), "plain old text"), "plain old text");
        assert_eq!(open_or_raw("bad key", "whatever"), "whatever");
    }
}
