//! crates/recall_core/src/session.rs
//!
//! Bearer session tokens.
//!
//! A token is 32 random bytes, base64url encoded, and is handed to the
//! client exactly once. Storage only ever sees its HMAC-SHA256 lookup hash,
//! keyed with a secret distinct from the password pepper, so a presented
//! token resolves with a plain equality lookup on the hash.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::{debug, error};

use crate::domain::User;
use crate::error::{ServiceError, ServiceResult};
use crate::ports::{DatabaseService, PortError};

type HmacSha256 = Hmac<Sha256>;

/// Bytes of entropy in every raw token.
pub const TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("random source unavailable: {0}")]
    EntropySource(String),
    #[error("session key rejected: {0}")]
    Key(String),
}

/// A freshly minted token together with the hash that gets stored.
pub struct IssuedToken {
    pub raw: String,
    pub lookup_hash: String,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("raw", &"[REDACTED]")
            .field("lookup_hash", &self.lookup_hash)
            .finish()
    }
}

pub struct SessionTokenService {
    key: SecretString,
    db: Arc<dyn DatabaseService>,
}

impl SessionTokenService {
    pub fn new(key: SecretString, db: Arc<dyn DatabaseService>) -> Result<Self, TokenError> {
        if key.expose_secret().is_empty() {
            return Err(TokenError::Key("key must not be empty".to_string()));
        }
        Ok(Self { key, db })
    }

    /// Produces a new raw token from the OS random source.
    pub fn issue(&self) -> Result<String, TokenError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| TokenError::EntropySource(e.to_string()))?;
        Ok(URL_SAFE.encode(bytes))
    }

    /// Issues a token and derives its lookup hash in one step.
    pub fn mint(&self) -> Result<IssuedToken, TokenError> {
        let raw = self.issue()?;
        let lookup_hash = self.derive_lookup_hash(&raw)?;
        Ok(IssuedToken { raw, lookup_hash })
    }

    /// Deterministic keyed hash of a raw token, safe to persist.
    pub fn derive_lookup_hash(&self, raw_token: &str) -> Result<String, TokenError> {
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret().as_bytes())
            .map_err(|e| TokenError::Key(e.to_string()))?;
        mac.update(raw_token.as_bytes());
        Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
    }

    /// Resolves a presented token to its user.
    ///
    /// Every way a token can be wrong collapses into `ServiceError::Auth`.
    pub async fn authenticate(&self, raw_token: &str) -> ServiceResult<User> {
        if !has_token_shape(raw_token) {
            debug!("rejecting session token with unexpected shape");
            return Err(ServiceError::Auth);
        }
        let lookup_hash = self.derive_lookup_hash(raw_token)?;
        match self.db.get_user_by_session_hash(&lookup_hash).await {
            Ok(user) => Ok(user),
            Err(PortError::NotFound(_)) => Err(ServiceError::Auth),
            Err(e) => {
                error!("Failed to resolve session: {:?}", e);
                Err(ServiceError::Internal("session lookup failed".to_string()))
            }
        }
    }
}

fn has_token_shape(raw_token: &str) -> bool {
    matches!(URL_SAFE.decode(raw_token), Ok(bytes) if bytes.len() == TOKEN_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDatabase;

    fn service(key: &str) -> SessionTokenService {
        let db: Arc<dyn DatabaseService> = Arc::new(InMemoryDatabase::new());
        SessionTokenService::new(SecretString::from(key.to_string()), db).unwrap()
    }

    #[test]
    fn issued_tokens_carry_32_bytes_and_differ() {
        let tokens = service("key");
        let a = tokens.issue().unwrap();
        let b = tokens.issue().unwrap();
        assert_ne!(a, b);
        assert_eq!(URL_SAFE.decode(&a).unwrap().len(), TOKEN_BYTES);
    }

    #[test]
    fn lookup_hash_is_deterministic_per_token_and_key() {
        let tokens = service("key");
        let raw = tokens.issue().unwrap();
        let other = tokens.issue().unwrap();
        let h1 = tokens.derive_lookup_hash(&raw).unwrap();
        assert_eq!(h1, tokens.derive_lookup_hash(&raw).unwrap());
        assert_ne!(h1, tokens.derive_lookup_hash(&other).unwrap());
        assert_ne!(h1, raw);
        assert_ne!(h1, service("other-key").derive_lookup_hash(&raw).unwrap());
    }

    #[test]
    fn empty_key_is_rejected() {
        let db: Arc<dyn DatabaseService> = Arc::new(InMemoryDatabase::new());
        assert!(matches!(
            SessionTokenService::new(SecretString::from(String::new()), db),
            Err(TokenError::Key(_))
        ));
    }

    #[test]
    fn debug_output_hides_raw_token() {
        let issued = service("key").mint().unwrap();
        let printed = format!("{issued:?}");
        assert!(!printed.contains(&issued.raw));
        assert!(printed.contains(&issued.lookup_hash));
    }

    #[tokio::test]
    async fn malformed_and_unknown_tokens_fail_alike() {
        let tokens = service("key");
        let unknown = tokens.issue().unwrap();
        assert!(matches!(tokens.authenticate("garbage").await, Err(ServiceError::Auth)));
        assert!(matches!(tokens.authenticate("").await, Err(ServiceError::Auth)));
        assert!(matches!(tokens.authenticate(&unknown).await, Err(ServiceError::Auth)));
    }
}
