use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Purpose;

/// SHA-256 digest of a secret bound to its identity and purpose. The binding
/// means the same plaintext issued under a different purpose or for a
/// different user stores a different hash, so a secret can never be replayed
/// across flows. Fast hashing is fine here: the inputs carry >= 256 bits of
/// entropy (link tokens) or are rate limited to a handful of guesses (OTPs).
pub fn bound_digest(purpose: Purpose, identity_id: Uuid, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(purpose.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(identity_id.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Recovery codes are short and never expire, so they get Argon2id
/// (19MB memory, 2 iterations) instead of a single fast hash.
pub fn hash_recovery_code(code: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let params = Params::new(19 * 1024, 2, 1, None).map_err(|e| format!("Invalid params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    argon2
        .hash_password(code.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| format!("Hashing failed: {e}"))
}

pub fn verify_recovery_code(code: &str, hash: &str) -> Result<bool, String> {
    let parsed = PasswordHash::new(hash).map_err(|e| format!("Invalid hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(code.as_bytes(), &parsed)
        .is_ok())
}
