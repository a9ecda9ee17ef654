/// Password hashing and verification using Argon2id.
use argon2::{
    password_hash::{Error as PasswordHashError, PasswordHasher as _, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};

use crate::error::{AuthError, Result};

/// Hashing seam. Production uses Argon2id; lockout tests substitute a
/// counting mock to prove the hasher is never consulted while an account
/// is locked.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// `Ok(false)` means "wrong password"; errors are reserved for a
    /// malformed stored hash or an internal hashing failure.
    fn verify(&self, plaintext: &str, hash: &str) -> Result<bool>;
}

/// Argon2id with the crate defaults (salted, adaptive work factor). The
/// verifier is constant-time with respect to the input.
#[derive(Default)]
pub struct Argon2PasswordHasher;

impl Argon2PasswordHasher {
    pub fn new() -> Self {
        Self
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(rand::thread_rng());
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, plaintext: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::Hashing(format!("invalid stored hash: {e}")))?;

        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PasswordHashError::Password) => Ok(false),
            Err(e) => Err(AuthError::Hashing(e.to_string())),
        }
    }
}

/// Validate password strength.
/// Requirements: minimum 8 characters, at least one uppercase letter, one
/// lowercase letter, one digit and one special character.
pub fn validate_password_strength(password: &str) -> Result<()> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword);
    }

    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());

    if has_uppercase && has_lowercase && has_digit && has_special {
        Ok(())
    } else {
        Err(AuthError::WeakPassword)
    }
}

/// Whether `plaintext` matches the current hash or any entry in the
/// bounded history. Used by password change to refuse reuse.
pub fn matches_recent_password(
    hasher: &dyn PasswordHasher,
    plaintext: &str,
    current_hash: &str,
    previous_hashes: &[String],
) -> Result<bool> {
    if hasher.verify(plaintext, current_hash)? {
        return Ok(true);
    }
    for old_hash in previous_hashes {
        if hasher.verify(plaintext, old_hash)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = Argon2PasswordHasher::new();
        let hash = hasher.hash("SecurePass123!").unwrap();
        assert!(hasher.verify("SecurePass123!", &hash).unwrap());
    }

    #[test]
    fn test_wrong_password_is_false_not_error() {
        let hasher = Argon2PasswordHasher::new();
        let hash = hasher.hash("SecurePass123!").unwrap();
        assert!(!hasher.verify("WrongPass123!", &hash).unwrap());
    }

    #[test]
    fn test_malformed_stored_hash_is_error() {
        let hasher = Argon2PasswordHasher::new();
        let result = hasher.verify("anything", "not-a-phc-string");
        assert!(matches!(result, Err(AuthError::Hashing(_))));
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = Argon2PasswordHasher::new();
        let a = hasher.hash("SecurePass123!").unwrap();
        let b = hasher.hash("SecurePass123!").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_weak_passwords_rejected() {
        for weak in ["Pass1!", "securepass123!", "SECUREPASS123!", "SecurePass!", "SecurePass123"] {
            assert!(
                validate_password_strength(weak).is_err(),
                "{weak:?} should be rejected"
            );
        }
        assert!(validate_password_strength("SecurePass123!").is_ok());
    }

    #[test]
    fn test_matches_recent_password_checks_history() {
        let hasher = Argon2PasswordHasher::new();
        let current = hasher.hash("CurrentPass1!").unwrap();
        let old = hasher.hash("OldPass1!").unwrap();
        let history = vec![old];

        assert!(matches_recent_password(&hasher, "CurrentPass1!", &current, &history).unwrap());
        assert!(matches_recent_password(&hasher, "OldPass1!", &current, &history).unwrap());
        assert!(!matches_recent_password(&hasher, "FreshPass1!", &current, &history).unwrap());
    }
}
