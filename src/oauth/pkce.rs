//! PKCE (RFC 7636) verifier/challenge pairs and anti-CSRF state values
//!
//! The verifier is 32 random bytes encoded as unpadded base64url (43
//! characters, within the 43..=128 range RFC 7636 requires). The challenge is
//! `BASE64URL(SHA256(ASCII(code_verifier)))`, sent with method `S256`.

use base64::Engine as _;
use rand::RngCore as _;
use sha2::{Digest, Sha256};

/// The only challenge method this crate emits.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// A PKCE verifier and its derived `S256` challenge.
///
/// # Examples
///
/// ```
/// use mcp_oauth_broker::oauth::pkce::{code_challenge, PkceChallenge};
///
/// let pkce = PkceChallenge::generate();
/// assert_eq!(pkce.verifier.len(), 43);
/// assert_eq!(pkce.challenge, code_challenge(&pkce.verifier));
/// ```
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Sent to the token endpoint as `code_verifier`
    pub verifier: String,

    /// Sent to the authorization endpoint as `code_challenge`
    pub challenge: String,
}

impl PkceChallenge {
    /// Generates a fresh verifier/challenge pair.
    pub fn generate() -> Self {
        let verifier = generate_code_verifier();
        let challenge = code_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Returns a high-entropy code verifier.
pub fn generate_code_verifier() -> String {
    random_urlsafe(32)
}

/// Computes the `S256` code challenge for `verifier`.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

/// Returns a random anti-CSRF `state` value.
pub fn generate_state() -> String {
    random_urlsafe(24)
}

fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
