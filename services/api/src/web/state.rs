//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use recall_core::{
    AccountService, ActivityService, Calendar, CredentialManager, DatabaseService, HashingCost,
    ProblemService, ReviewEngine, SessionTokenService,
};
use secrecy::SecretString;

use crate::error::ApiError;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub problems: Arc<ProblemService>,
    pub reviews: Arc<ReviewEngine>,
    pub activity: Arc<ActivityService>,
}

/// The two process-wide secrets. They are only ever handed to the services
/// that use them.
pub struct Secrets {
    pub password_pepper: SecretString,
    pub session_hmac_key: SecretString,
}

impl AppState {
    /// Wires every core service on top of one storage backend.
    pub fn build(
        db: Arc<dyn DatabaseService>,
        calendar: Calendar,
        secrets: Secrets,
        hashing_cost: HashingCost,
    ) -> Result<Self, ApiError> {
        let credentials = CredentialManager::new(secrets.password_pepper, hashing_cost)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let tokens = SessionTokenService::new(secrets.session_hmac_key, db.clone())
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok(Self {
            accounts: Arc::new(AccountService::new(db.clone(), credentials, tokens)),
            problems: Arc::new(ProblemService::new(db.clone(), calendar.clone())),
            reviews: Arc::new(ReviewEngine::new(db.clone(), calendar.clone())),
            activity: Arc::new(ActivityService::new(db, calendar)),
        })
    }
}
