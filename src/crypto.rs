//! Sealing of platform OAuth tokens at rest.
//!
//! Stored layout: `0x01 | nonce (12) | ciphertext+tag`. The associated data
//! is `user_id|platform`, so a ciphertext copied onto another connection row
//! no longer opens. Rows written before encryption was introduced hold raw
//! UTF-8 and carry no version byte; they are read back unchanged until
//! `campaigniq reseal-tokens` rewrites them.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::platform::Platform;

const SEALED_V1: u8 = 0x01;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + NONCE_LEN;
const MIN_SEALED_LEN: usize = HEADER_LEN + TAG_LEN;

pub const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("crypto key must be {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("sealed token is truncated")]
    InvalidFormat,
    #[error("stored token is empty")]
    EmptyCiphertext,
}

/// AES-256 key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey(Vec<u8>);

impl std::fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CryptoKey([REDACTED])")
    }
}

impl CryptoKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(Self(bytes))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

fn connection_aad(user_id: Uuid, platform: Platform) -> Vec<u8> {
    format!("{user_id}|{}", platform.as_str()).into_bytes()
}

/// True when `stored` carries the sealed layout rather than legacy plaintext.
pub fn is_encrypted_payload(stored: &[u8]) -> bool {
    stored.len() >= MIN_SEALED_LEN && stored[0] == SEALED_V1
}

/// Encrypt a platform token for the given user's connection.
pub fn seal_token(
    key: &CryptoKey,
    user_id: Uuid,
    platform: Platform,
    token: &str,
) -> Result<Vec<u8>, CryptoError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let aad = connection_aad(user_id, platform);
    let body = key
        .cipher()
        .encrypt(
            &nonce,
            Payload {
                msg: token.as_bytes(),
                aad: &aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut sealed = Vec::with_capacity(HEADER_LEN + body.len());
    sealed.push(SEALED_V1);
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&body);
    Ok(sealed)
}

/// Decrypt a stored token. Legacy plaintext rows are returned as-is.
pub fn open_token(
    key: &CryptoKey,
    user_id: Uuid,
    platform: Platform,
    stored: &[u8],
) -> Result<String, CryptoError> {
    let bytes = match stored.first() {
        None => return Err(CryptoError::EmptyCiphertext),
        Some(&SEALED_V1) => {
            if stored.len() < MIN_SEALED_LEN {
                return Err(CryptoError::InvalidFormat);
            }
            let (header, body) = stored.split_at(HEADER_LEN);
            let aad = connection_aad(user_id, platform);
            key.cipher()
                .decrypt(
                    Nonce::from_slice(&header[1..]),
                    Payload { msg: body, aad: &aad },
                )
                .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?
        }
        Some(_) => stored.to_vec(),
    };

    String::from_utf8(bytes).map_err(|e| CryptoError::DecryptionFailed(format!("invalid UTF-8: {e}")))
}
