//! Password value object - one-way salted hashing of credentials.
//!
//! Argon2id with a tunable work factor. Plain text never leaves this module
//! in any form other than its hash.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::error::{DomainError, DomainResult};

/// Argon2 work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashCost {
    fn argon2(&self) -> DomainResult<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| DomainError::hashing(format!("invalid hash cost: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Password value object that handles hashing and verification.
#[derive(Clone, PartialEq, Eq)]
pub struct Password {
    hash: String,
}

// Don't expose hash in debug output
impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Password")
            .field("hash", &"[REDACTED]")
            .finish()
    }
}

impl Password {
    /// Hash a plain text password with the default work factor.
    ///
    /// # Errors
    /// `EmptyPassword` for empty input, `Hashing` if the backend fails.
    pub fn hash(plain_text: &str) -> DomainResult<Self> {
        Self::hash_with(plain_text, &HashCost::default())
    }

    /// Hash a plain text password with an explicit work factor.
    pub fn hash_with(plain_text: &str, cost: &HashCost) -> DomainResult<Self> {
        if plain_text.is_empty() {
            return Err(DomainError::EmptyPassword);
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = cost
            .argon2()?
            .hash_password(plain_text.as_bytes(), &salt)
            .map_err(|e| DomainError::hashing(e.to_string()))?;

        Ok(Self {
            hash: hash.to_string(),
        })
    }

    /// Wrap an existing hash (from storage).
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    /// Get the hash string for storage.
    pub fn as_str(&self) -> &str {
        &self.hash
    }

    /// Consume and return the hash string.
    pub fn into_string(self) -> String {
        self.hash
    }

    /// Verify a plain text password against this hash.
    ///
    /// A malformed stored hash is reported as a mismatch. The parameters
    /// encoded in the hash are used, so hashes made with any cost verify.
    pub fn verify(&self, plain_text: &str) -> bool {
        match PasswordHash::new(&self.hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(plain_text.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Cheap parameters keep the suite fast; verification reads them from the hash.
    fn fast() -> HashCost {
        HashCost {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_password_hash_and_verify() {
        let plain = "SecurePassword123!";
        let password = Password::hash_with(plain, &fast()).unwrap();

        assert!(password.verify(plain));
        assert!(!password.verify("WrongPassword123"));
    }

    #[test]
    fn test_hash_is_not_plain_text() {
        let password = Password::hash_with("pw1", &fast()).unwrap();
        assert_ne!(password.as_str(), "pw1");
        assert!(password.as_str().starts_with("$argon2id$"));
    }

    #[test]
    fn test_password_from_hash() {
        let plain = "TestPassword123";
        let hash = Password::hash_with(plain, &fast()).unwrap().into_string();

        let restored = Password::from_hash(hash);
        assert!(restored.verify(plain));
    }

    #[test]
    fn test_same_password_different_salts() {
        let plain = "SamePassword123";
        let pass1 = Password::hash_with(plain, &fast()).unwrap();
        let pass2 = Password::hash_with(plain, &fast()).unwrap();

        assert_ne!(pass1.as_str(), pass2.as_str());
        assert!(pass1.verify(plain));
        assert!(pass2.verify(plain));
    }

    #[test]
    fn test_empty_password_rejected() {
        assert_eq!(Password::hash(""), Err(DomainError::EmptyPassword));
    }

    #[test]
    fn test_single_character_password_hashes() {
        let password = Password::hash_with("x", &fast()).unwrap();
        assert!(password.verify("x"));
        assert!(!password.verify("y"));
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        let password = Password::from_hash("not-a-phc-string");
        assert!(!password.verify("anything"));
        assert!(!password.verify(""));
    }

    #[test]
    fn test_invalid_cost_is_hashing_error() {
        let cost = HashCost {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(matches!(
            Password::hash_with("pw", &cost),
            Err(DomainError::Hashing(_))
        ));
    }

    #[test]
    fn test_debug_redacts_hash() {
        let password = Password::hash_with("secret", &fast()).unwrap();
        let debug = format!("{:?}", password);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("argon2"));
    }
}
