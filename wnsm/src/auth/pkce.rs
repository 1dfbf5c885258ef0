use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use sha2::{Digest, Sha256};

const VERIFIER_LENGTH: usize = 64;

/// Proof key of a single login attempt.
pub struct Pkce {
    pub verifier: String,

    /// `BASE64URL(SHA256(verifier))`, sent with the authorization request.
    pub challenge: String,
}

impl Pkce {
    pub const METHOD: &str = "S256";

    pub fn generate() -> Self {
        let verifier =
            thread_rng().sample_iter(&Alphanumeric).take(VERIFIER_LENGTH).map(char::from).collect();
        Self::from_verifier(verifier)
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self { verifier, challenge }
    }
}
