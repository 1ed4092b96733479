//! PKCE (RFC 7636) verifier and challenge generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes behind a verifier (86 characters once encoded).
const VERIFIER_BYTES: usize = 64;

/// Generates a code verifier: 64 random bytes, base64url without padding.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Computes the S256 challenge: base64url(SHA-256(verifier)), no padding.
pub fn generate_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// A verifier and its challenge, valid for a single authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// Secret kept locally and sent with the code exchange.
    pub verifier: String,
    /// Hash of the verifier, sent with the authorization request.
    pub challenge: String,
}

impl PkcePair {
    /// Generates a fresh pair.
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = generate_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}
