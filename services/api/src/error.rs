//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered to HTTP clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use recall_core::ServiceError;
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core services.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure to run the schema migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A malformed request that never reached a service.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Service(ServiceError::Validation(e)) => {
                (StatusCode::BAD_REQUEST, e.message().to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Service(ServiceError::Auth) => {
                (StatusCode::UNAUTHORIZED, "Invalid Credentials".to_string())
            }
            ApiError::Service(ServiceError::NotFound) => {
                (StatusCode::NOT_FOUND, "Not found".to_string())
            }
            ApiError::Service(ServiceError::Conflict(msg)) => (StatusCode::CONFLICT, msg.clone()),
            other => {
                error!("Request failed: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong. Please try again".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::ValidationError;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn service_errors_map_to_statuses() {
        assert_eq!(
            status_of(ServiceError::Validation(ValidationError::new("bad")).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(ServiceError::Auth.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ServiceError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(ServiceError::Conflict("taken".to_string()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::Internal("db down".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
