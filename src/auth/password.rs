//! Password hashing and verification using Argon2id.
//!
//! Hashes are PHC-format strings, so the algorithm and its parameters
//! travel with the hash and verification keeps working across cost or
//! scheme upgrades.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::auth::error::AuthError;

/// Hash a plaintext password with a fresh random salt.
///
/// # Errors
/// Returns [`AuthError::Internal`] if hashing fails (effectively only
/// under allocation pressure).
pub fn hash(plaintext: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

/// Verify a plaintext password against a stored PHC-format hash.
///
/// Returns `Ok(true)` on match, `Ok(false)` on mismatch. A malformed
/// stored hash is an error, not a mismatch.
pub fn verify(plaintext: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("invalid password hash: {e}")))?;

    match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Internal(anyhow::anyhow!(
            "password verification failed: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_matches() {
        let hashed = hash("hunter2-hunter2").unwrap();
        assert!(verify("hunter2-hunter2", &hashed).unwrap());
    }

    #[test]
    fn wrong_password_does_not_match() {
        let hashed = hash("hunter2-hunter2").unwrap();
        assert!(!verify("wrong-password", &hashed).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash("same-password").unwrap();
        let second = hash("same-password").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn hash_carries_scheme_identifier() {
        let hashed = hash("whatever-password").unwrap();
        assert!(hashed.starts_with("$argon2"));
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify("pw", "not-a-phc-hash").is_err());
    }
}
