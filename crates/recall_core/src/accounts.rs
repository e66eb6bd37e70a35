//! crates/recall_core/src/accounts.rs
//!
//! Signup, login, session resolution and account maintenance.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::credentials::{CredentialError, CredentialManager};
use crate::domain::{AccountChanges, NewUser, User};
use crate::error::{ServiceError, ServiceResult};
use crate::ports::{DatabaseService, PortError};
use crate::session::SessionTokenService;
use crate::validation::{
    normalized_email, user_create_checks, user_update_checks, UserDraft, ValidationPipeline,
};

/// Fields a user may change on their own account. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

pub struct AccountService {
    db: Arc<dyn DatabaseService>,
    credentials: CredentialManager,
    tokens: SessionTokenService,
    create_checks: ValidationPipeline<UserDraft>,
    update_checks: ValidationPipeline<UserDraft>,
}

impl AccountService {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        credentials: CredentialManager,
        tokens: SessionTokenService,
    ) -> Self {
        Self {
            db,
            credentials,
            tokens,
            create_checks: user_create_checks(),
            update_checks: user_update_checks(),
        }
    }

    /// Creates an account and signs it in. The raw token is returned once
    /// and never stored.
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        raw_password: &str,
    ) -> ServiceResult<(User, String)> {
        let mut draft = UserDraft {
            name: name.trim().to_string(),
            email: email.to_string(),
            password: raw_password.to_string(),
        };
        self.create_checks.run(&mut draft)?;
        self.ensure_email_available(&draft.email, None).await?;

        let password_hash = self.credentials.hash(&draft.password)?;
        let token = self.tokens.mint()?;

        let user = self
            .db
            .create_user(&NewUser {
                name: draft.name,
                email: draft.email,
                password_hash,
                session_token_hash: token.lookup_hash,
            })
            .await?;

        info!(user_id = %user.id, "user signed up");
        Ok((user, token.raw))
    }

    /// Verifies credentials and rotates the session: any token issued
    /// before this call stops working.
    pub async fn login(&self, email: &str, raw_password: &str) -> ServiceResult<(User, String)> {
        let email = normalized_email(email);
        let creds = match self.db.get_credentials_by_email(&email).await {
            Ok(creds) => creds,
            Err(PortError::NotFound(_)) => {
                self.credentials.verify_decoy(raw_password);
                return Err(ServiceError::Auth);
            }
            Err(e) => return Err(e.into()),
        };

        match self.credentials.verify(raw_password, &creds.password_hash) {
            Ok(true) => {}
            Ok(false) => return Err(ServiceError::Auth),
            Err(e @ CredentialError::MalformedHash(_)) => {
                error!(user_id = %creds.user_id, "Stored password hash unusable: {}", e);
                return Err(ServiceError::Internal("credential check failed".to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let raw = self.rotate_session(creds.user_id).await?;
        let user = self.db.get_user_by_id(creds.user_id).await?;
        info!(user_id = %user.id, "user logged in");
        Ok((user, raw))
    }

    pub async fn authenticate_by_token(&self, raw_token: &str) -> ServiceResult<User> {
        self.tokens.authenticate(raw_token).await
    }

    /// Revokes the current session server-side by rotating to a token that
    /// is never handed out.
    pub async fn logout(&self, user_id: Uuid) -> ServiceResult<()> {
        self.rotate_session(user_id).await?;
        info!(user_id = %user_id, "user logged out");
        Ok(())
    }

    pub async fn update_account(
        &self,
        user_id: Uuid,
        update: AccountUpdate,
    ) -> ServiceResult<User> {
        let current = self.db.get_user_by_id(user_id).await?;
        let mut draft = UserDraft {
            name: update
                .name
                .as_deref()
                .map(str::trim)
                .map(str::to_string)
                .unwrap_or_else(|| current.name.clone()),
            email: update.email.clone().unwrap_or_else(|| current.email.clone()),
            password: update.password.unwrap_or_default(),
        };
        self.update_checks.run(&mut draft)?;

        let email_changed = draft.email != current.email;
        if email_changed {
            self.ensure_email_available(&draft.email, Some(user_id)).await?;
        }
        let password_hash = if draft.password.is_empty() {
            None
        } else {
            Some(self.credentials.hash(&draft.password)?)
        };

        let changes = AccountChanges {
            name: update.name.map(|_| draft.name),
            email: email_changed.then_some(draft.email),
            password_hash,
        };
        let user = self.db.update_account(user_id, &changes).await?;
        info!(user_id = %user.id, "account updated");
        Ok(user)
    }

    async fn rotate_session(&self, user_id: Uuid) -> ServiceResult<String> {
        let token = self.tokens.mint()?;
        self.db
            .replace_session_hash(user_id, &token.lookup_hash)
            .await?;
        Ok(token.raw)
    }

    async fn ensure_email_available(&self, email: &str, owner: Option<Uuid>) -> ServiceResult<()> {
        match self.db.get_credentials_by_email(email).await {
            Ok(existing) if Some(existing.user_id) == owner => Ok(()),
            Ok(_) => Err(ServiceError::Conflict(
                "email address is already in use".to_string(),
            )),
            Err(PortError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
