use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE verifier and its S256 challenge (RFC 7636).
///
/// The verifier stays with the browser's pre-auth cookies; only the
/// challenge travels in the authorization URL.
#[derive(Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    #[must_use]
    pub fn generate() -> Self {
        let verifier = random_urlsafe::<48>();
        let challenge = code_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// `BASE64URL(SHA256(verifier))`
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Unguessable CSRF `state` for one login attempt (16 random bytes).
#[must_use]
pub fn generate_state() -> String {
    random_urlsafe::<16>()
}

fn random_urlsafe<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
