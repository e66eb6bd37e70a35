//! crates/recall_core/src/credentials.rs
//!
//! One-way password hashing with a server-side pepper.
//!
//! Hashes are Argon2id in PHC string format, so the salt and cost parameters
//! travel with each stored hash and old hashes keep verifying after the cost
//! is raised.

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};

/// Shortest accepted raw password, in characters.
pub const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("password must be at least {MIN_PASSWORD_CHARS} characters long")]
    WeakInput,
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingCost {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Hashes and verifies passwords. Holds no storage handle.
pub struct CredentialManager {
    pepper: SecretString,
    argon2: Argon2<'static>,
    /// Hash of a random password at the configured cost. Verified against
    /// when no stored hash exists so that path costs the same.
    decoy_hash: String,
}

impl CredentialManager {
    /// Builds a manager for the given pepper and cost.
    ///
    /// Fails if the cost parameters are outside what Argon2 accepts.
    pub fn new(pepper: SecretString, cost: HashingCost) -> Result<Self, CredentialError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| CredentialError::Hashing(format!("invalid Argon2 parameters: {e}")))?;
        let mut manager = Self {
            pepper,
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            decoy_hash: String::new(),
        };
        let decoy = SaltString::generate(&mut OsRng);
        manager.decoy_hash = manager.hash(decoy.as_str())?;
        Ok(manager)
    }

    /// Hashes `raw_password` with a fresh salt.
    pub fn hash(&self, raw_password: &str) -> Result<String, CredentialError> {
        if raw_password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(CredentialError::WeakInput);
        }
        let salt = SaltString::generate(&mut OsRng);
        let peppered = self.peppered(raw_password);
        let hash = self
            .argon2
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|e| CredentialError::Hashing(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Returns `Ok(false)` on a wrong password and an error only when the
    /// stored hash cannot be parsed or the primitive itself fails.
    pub fn verify(&self, raw_password: &str, stored_hash: &str) -> Result<bool, CredentialError> {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|e| CredentialError::MalformedHash(e.to_string()))?;
        let peppered = self.peppered(raw_password);
        match self.argon2.verify_password(peppered.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CredentialError::Hashing(e.to_string())),
        }
    }

    /// Runs a full verification against the decoy hash and discards the
    /// result. Used when the account being checked does not exist.
    pub fn verify_decoy(&self, raw_password: &str) {
        let _ = self.verify(raw_password, &self.decoy_hash);
    }

    fn peppered(&self, raw_password: &str) -> String {
        let pepper = self.pepper.expose_secret();
        let mut buf = String::with_capacity(raw_password.len() + pepper.len());
        buf.push_str(raw_password);
        buf.push_str(pepper);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_cost() -> HashingCost {
        HashingCost {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn manager(pepper: &str) -> CredentialManager {
        CredentialManager::new(SecretString::from(pepper.to_string()), cheap_cost()).unwrap()
    }

    #[test]
    fn hash_then_verify_accepts_same_password() {
        let creds = manager("pepper");
        let hash = creds.hash("goodpassword").unwrap();
        assert!(creds.verify("goodpassword", &hash).unwrap());
    }

    #[test]
    fn verify_rejects_other_password_without_error() {
        let creds = manager("pepper");
        let hash = creds.hash("goodpassword").unwrap();
        assert!(!creds.verify("goodpassworD", &hash).unwrap());
        assert!(!creds.verify("", &hash).unwrap());
    }

    #[test]
    fn same_password_hashes_differently() {
        let creds = manager("pepper");
        let a = creds.hash("goodpassword").unwrap();
        let b = creds.hash("goodpassword").unwrap();
        assert_ne!(a, b);
        assert!(!a.contains("goodpassword"));
    }

    #[test]
    fn pepper_is_part_of_the_hash() {
        let hash = manager("pepper-one").hash("goodpassword").unwrap();
        assert!(!manager("pepper-two").verify("goodpassword", &hash).unwrap());
    }

    #[test]
    fn short_password_is_weak() {
        let creds = manager("pepper");
        assert!(matches!(creds.hash("1234567"), Err(CredentialError::WeakInput)));
        // Length is counted in characters, not bytes.
        assert!(matches!(creds.hash("ééééééé"), Err(CredentialError::WeakInput)));
        assert!(creds.hash("12345678").is_ok());
    }

    #[test]
    fn decoy_hash_uses_the_configured_cost() {
        let creds = manager("pepper");
        let decoy = PasswordHash::new(&creds.decoy_hash).unwrap();
        assert_eq!(decoy.algorithm.as_str(), "argon2id");
        let params = Params::try_from(&decoy).unwrap();
        assert_eq!(params.m_cost(), 64);
        assert_eq!(params.t_cost(), 1);
        assert_eq!(params.p_cost(), 1);
        // Any password is rejected, and never with an error.
        assert!(!creds.verify("goodpassword", &creds.decoy_hash).unwrap());
        creds.verify_decoy("goodpassword");
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        let creds = manager("pepper");
        assert!(matches!(
            creds.verify("goodpassword", "not-a-phc-string"),
            Err(CredentialError::MalformedHash(_))
        ));
    }
}
