//! Encrypted command codec
//!
//! Tokens are framed as:
//! ```text
//! base64url( [ 12 bytes: nonce ][ N bytes: ChaCha20-Poly1305 ciphertext + 16 byte tag ] )
//! ```
//!
//! The sealed plaintext is the canonical JSON form of the value.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Symmetric key length in bytes
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// Poly1305 tag length in bytes
pub const TAG_LEN: usize = 16;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Malformed token or wrong key. Carries no content.
    #[error("decryption failed: token is malformed or sealed under a different key")]
    Decryption,

    #[error("decrypted payload is not a valid command (line {line}, column {column})")]
    InvalidPayload { line: usize, column: usize },

    #[error("failed to encode command: {0}")]
    Encode(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Process-wide symmetric key
#[derive(Clone, PartialEq, Eq)]
pub struct CommandKey([u8; KEY_LEN]);

impl CommandKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse the URL-safe base64 form written by [`CommandKey::encode`]
    pub fn from_encoded(encoded: &str) -> Result<Self, CodecError> {
        let raw = URL_SAFE
            .decode(encoded.trim().as_bytes())
            .map_err(|e| CodecError::InvalidKey(e.to_string()))?;

        let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            CodecError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, raw.len()))
        })?;

        Ok(Self(bytes))
    }

    pub fn encode(&self) -> String {
        URL_SAFE.encode(self.0)
    }
}

impl fmt::Debug for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CommandKey(..)")
    }
}

/// Seals and opens command payloads under one key
pub struct EncryptedChannel {
    cipher: ChaCha20Poly1305,
}

impl EncryptedChannel {
    pub fn new(key: &CommandKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key.0)),
        }
    }

    /// Serialize `value` to JSON and seal it into a token
    pub fn encrypt<T: Serialize>(&self, value: &T) -> Result<String, CodecError> {
        let json = serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), json.as_slice())
            .map_err(|_| CodecError::Encode("aead seal failed".into()))?;

        let mut framed = Vec::with_capacity(NONCE_LEN + sealed.len());
        framed.extend_from_slice(&nonce);
        framed.extend_from_slice(&sealed);

        Ok(URL_SAFE.encode(framed))
    }

    /// Open a token and deserialize the JSON inside
    pub fn decrypt<T: DeserializeOwned>(&self, token: &str) -> Result<T, CodecError> {
        let framed = URL_SAFE
            .decode(token.trim().as_bytes())
            .map_err(|_| CodecError::Decryption)?;

        if framed.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::Decryption);
        }

        let (nonce, sealed) = framed.split_at(NONCE_LEN);
        let json = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CodecError::Decryption)?;

        // serde_json messages can quote the input; keep only the position
        serde_json::from_slice(&json).map_err(|e| CodecError::InvalidPayload {
            line: e.line(),
            column: e.column(),
        })
    }
}
