//! PKCE (RFC 7636) and OAuth state helpers.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

/// Unreserved URI characters allowed in a code verifier.
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Generate a code verifier of `length` characters using the OS CSPRNG.
///
/// `length` is validated by configuration to lie in 43..=128.
pub fn generate_code_verifier(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| VERIFIER_CHARSET[rng.gen_range(0..VERIFIER_CHARSET.len())] as char)
        .collect()
}

/// `base64url(SHA-256(verifier))` without padding.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate a cryptographically secure state token (32 bytes, base64url, 43 chars).
pub fn generate_secure_state() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    base64_url::encode(&bytes)
}
