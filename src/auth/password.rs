/// Password Hashing and Verification
///
/// Handles password hashing with bcrypt behind the `PasswordHasher`
/// capability so the auth service can be driven with a cheaper cost in tests.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::AuthError;

/// bcrypt work factor used for every stored password
pub const BCRYPT_COST: u32 = DEFAULT_COST;

pub trait PasswordHasher: Send + Sync {
    /// Produce a salted, self-describing digest of `plaintext`.
    fn hash(&self, plaintext: &str) -> Result<String, AuthError>;

    /// Constant-time check of `plaintext` against `digest`.
    ///
    /// A malformed digest is reported exactly like a wrong password.
    fn verify(&self, plaintext: &str, digest: &str) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new() -> Self {
        Self { cost: BCRYPT_COST }
    }

    /// Override the work factor. Only tests should go below [`BCRYPT_COST`].
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        hash(plaintext, self.cost)
            .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        match verify(plaintext, digest) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::debug!("Stored password digest could not be parsed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> BcryptHasher {
        BcryptHasher::with_cost(4)
    }

    #[test]
    fn test_hash_password() {
        let password = "ValidPassword123";
        let hash = hasher().hash(password).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_hash_is_salted() {
        let first = hasher().hash("pw1").unwrap();
        let second = hasher().hash("pw1").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_password() {
        let hash = hasher().hash("pw1").expect("Failed to hash password");

        assert!(hasher().verify("pw1", &hash));
    }

    #[test]
    fn test_verify_wrong_password() {
        let hash = hasher().hash("pw1").expect("Failed to hash password");

        assert!(!hasher().verify("pw2", &hash));
    }

    #[test]
    fn test_malformed_digest_is_a_plain_mismatch() {
        assert!(!hasher().verify("pw1", "not-a-bcrypt-digest"));
        assert!(!hasher().verify("pw1", ""));
    }

    #[test]
    fn test_default_cost() {
        assert_eq!(BcryptHasher::default().cost, BCRYPT_COST);
    }
}
