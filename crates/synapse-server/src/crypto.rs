//! Payload encryption
//!
//! Domain payloads are encrypted with AES-256-GCM before they reach the
//! database. Stored form is base64 of `nonce (12 bytes) || ciphertext || tag`.

use std::fmt;

use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use thiserror::Error;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// Errors from the payload cipher
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption key must be {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("Encryption key is not valid base64: {0}")]
    InvalidKeyEncoding(#[source] base64::DecodeError),

    #[error("Encryption failed")]
    Encrypt,

    #[error("Stored payload is not valid base64: {0}")]
    Encoding(#[source] base64::DecodeError),

    #[error("Stored payload is too short ({0} bytes)")]
    Truncated(usize),

    /// Wrong key or tampered ciphertext
    #[error("Decryption failed")]
    Decrypt,
}

/// Encrypts and decrypts stored payloads
pub struct PayloadCipher {
    cipher: Aes256Gcm,
}

impl PayloadCipher {
    /// Create a cipher from raw key bytes
    pub fn from_key(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: key.len(),
            });
        }

        let cipher = Aes256Gcm::new(GenericArray::from_slice(key));
        Ok(Self { cipher })
    }

    /// Create a cipher from a base64-encoded key
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(CryptoError::InvalidKeyEncoding)?;
        Self::from_key(&key)
    }

    /// Generate a random key, base64-encoded
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        STANDARD.encode(key)
    }

    /// Encrypt a plaintext into its stored form
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    /// Decrypt a stored payload
    pub fn decrypt(&self, stored: &str) -> Result<Vec<u8>, CryptoError> {
        let sealed = STANDARD.decode(stored).map_err(CryptoError::Encoding)?;
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Truncated(sealed.len()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }
}

impl fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadCipher")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> PayloadCipher {
        PayloadCipher::from_base64(&PayloadCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_decrypt_recovers_plaintext() {
        let cipher = cipher();
        let stored = cipher.encrypt(br#"{"apiKeys":{"gemini":"g-key"}}"#).unwrap();

        assert!(!stored.contains("g-key"));
        assert_eq!(
            cipher.decrypt(&stored).unwrap(),
            br#"{"apiKeys":{"gemini":"g-key"}}"#
        );
    }

    #[test]
    fn test_nonce_is_fresh_per_write() {
        let cipher = cipher();
        assert_ne!(cipher.encrypt(b"same").unwrap(), cipher.encrypt(b"same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let stored = cipher().encrypt(b"secret").unwrap();
        assert!(matches!(cipher().decrypt(&stored), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let cipher = cipher();
        let mut sealed = STANDARD.decode(cipher.encrypt(b"data").unwrap()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;

        assert!(matches!(
            cipher.decrypt(&STANDARD.encode(sealed)),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn test_malformed_stored_payloads() {
        let cipher = cipher();
        assert!(matches!(cipher.decrypt("not base64!"), Err(CryptoError::Encoding(_))));
        assert!(matches!(
            cipher.decrypt(&STANDARD.encode([0u8; 10])),
            Err(CryptoError::Truncated(10))
        ));
    }

    #[test]
    fn test_key_validation() {
        assert!(matches!(
            PayloadCipher::from_key(&[0u8; 16]),
            Err(CryptoError::InvalidKeySize { actual: 16, .. })
        ));
        assert!(matches!(
            PayloadCipher::from_base64("%%%"),
            Err(CryptoError::InvalidKeyEncoding(_))
        ));
        assert!(PayloadCipher::from_key(&[7u8; KEY_SIZE]).is_ok());
    }
}
