//! crates/recall_core/src/error.rs
//!
//! The error returned by every public operation of the core services.

use crate::credentials::CredentialError;
use crate::ports::PortError;
use crate::session::TokenError;
use crate::validation::ValidationError;

/// Caller-facing error taxonomy.
///
/// `Auth` and `NotFound` deliberately carry no detail: a failed login does
/// not say which check failed, and a problem owned by someone else looks
/// exactly like a missing one.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid credentials or session")]
    Auth,

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<PortError> for ServiceError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(_) => ServiceError::NotFound,
            PortError::Conflict(msg) => ServiceError::Conflict(msg),
            PortError::StaleWrite(msg) => {
                ServiceError::Conflict(format!("concurrent update, try again ({msg})"))
            }
            PortError::Unexpected(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<CredentialError> for ServiceError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::WeakInput => {
                ServiceError::Validation(ValidationError::new(err.to_string()))
            }
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}
