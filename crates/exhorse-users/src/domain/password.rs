//! Password hashing with Argon2id.
//!
//! Stored hashes are PHC strings (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`)
//! with a fresh random salt per account. A process-wide pepper, when set, is
//! mixed in as the Argon2 secret and never stored.

use std::fmt;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use exhorse_core::error::DomainError;

/// Hashes and verifies passwords.
#[derive(Clone)]
pub struct PasswordHasher {
    pepper: String,
}

impl fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

impl PasswordHasher {
    /// Creates a hasher keyed by `pepper`. An empty pepper disables it.
    #[must_use]
    pub fn new(pepper: impl Into<String>) -> Self {
        Self {
            pepper: pepper.into(),
        }
    }

    /// Hashes `password` under a fresh salt with the default Argon2id cost.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if Argon2 rejects the input, for
    /// example a pepper or password beyond its length limits.
    pub fn hash(&self, password: &str) -> Result<String, DomainError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = self.argon2().map_err(rejected)?;
        let hash = password_hash::PasswordHasher::hash_password(&argon2, password.as_bytes(), &salt)
            .map_err(rejected)?;
        Ok(hash.to_string())
    }

    /// Returns `true` if `password` matches `stored`. The cost parameters
    /// come from `stored`, so hashes made under an older cost still verify.
    #[must_use]
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        self.argon2()
            .is_ok_and(|argon2| argon2.verify_password(password.as_bytes(), &parsed).is_ok())
    }

    fn argon2(&self) -> Result<Argon2<'_>, argon2::Error> {
        if self.pepper.is_empty() {
            return Ok(Argon2::default());
        }
        Argon2::new_with_secret(
            self.pepper.as_bytes(),
            Algorithm::Argon2id,
            Version::V0x13,
            Params::default(),
        )
    }
}

fn rejected(error: impl fmt::Display) -> DomainError {
    DomainError::Validation(format!("password cannot be hashed: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verifies_and_is_salted() {
        let hasher = PasswordHasher::new("pepper");

        let first = hasher.hash("hunter2").unwrap();
        let second = hasher.hash("hunter2").unwrap();

        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
        assert!(!first.contains("hunter2"));
        assert!(hasher.verify("hunter2", &first));
        assert!(hasher.verify("hunter2", &second));
    }

    #[test]
    fn test_wrong_password_or_pepper_fails() {
        let hasher = PasswordHasher::new("pepper");
        let stored = hasher.hash("hunter2").unwrap();

        assert!(!hasher.verify("hunter3", &stored));
        assert!(!PasswordHasher::new("other").verify("hunter2", &stored));
        assert!(!hasher.verify("hunter2", "no-separator"));
        assert!(!hasher.verify("hunter2", ""));
    }

    #[test]
    fn test_hash_from_older_cost_still_verifies() {
        // Arrange
        let params = Params::new(8 * 1024, 1, 1, None).unwrap();
        let older = Argon2::new_with_secret(b"pepper", Algorithm::Argon2id, Version::V0x13, params)
            .unwrap();
        let salt = SaltString::generate(&mut OsRng);
        let stored = password_hash::PasswordHasher::hash_password(&older, b"hunter2", &salt)
            .unwrap()
            .to_string();

        // Act
        let hasher = PasswordHasher::new("pepper");

        // Assert
        assert!(stored.contains("m=8192,t=1,p=1"));
        assert!(hasher.verify("hunter2", &stored));
        assert!(!hasher.verify("hunter3", &stored));
    }

    #[test]
    fn test_empty_pepper_hashes_without_secret() {
        let hasher = PasswordHasher::new("");

        let stored = hasher.hash("hunter2").unwrap();

        assert!(hasher.verify("hunter2", &stored));
        assert!(!PasswordHasher::new("pepper").verify("hunter2", &stored));
    }

    #[test]
    fn test_debug_hides_pepper() {
        let hasher = PasswordHasher::new("super-secret");

        assert!(!format!("{hasher:?}").contains("super-secret"));
    }
}
