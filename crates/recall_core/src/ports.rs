//! crates/recall_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete database behind it.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{
    AccountChanges, HeatmapDay, NewProblem, NewUser, Problem, ProblemPage, ProblemQuery,
    ReviewCommit, ReviewReceipt, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A unique constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The row changed since it was read.
    #[error("Stale write: {0}")]
    StaleWrite(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Users ---

    /// Inserts a user. Fails with `Conflict` if the email is taken.
    async fn create_user(&self, user: &NewUser) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    /// Looks up login material by (already normalized) email.
    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    /// Resolves the owner of a session lookup hash.
    async fn get_user_by_session_hash(&self, token_hash: &str) -> PortResult<User>;

    /// Overwrites the stored session lookup hash, invalidating the previous one.
    async fn replace_session_hash(&self, user_id: Uuid, token_hash: &str) -> PortResult<()>;

    /// Applies the provided fields. Fails with `Conflict` if the new email is taken.
    async fn update_account(&self, user_id: Uuid, changes: &AccountChanges) -> PortResult<User>;

    // --- Problems ---

    async fn create_problem(&self, problem: &NewProblem) -> PortResult<Problem>;

    /// Returns live (not deleted) problems only.
    async fn get_problem_by_id(&self, problem_id: Uuid) -> PortResult<Problem>;

    async fn list_problems(&self, owner_id: Uuid, query: &ProblemQuery) -> PortResult<ProblemPage>;

    async fn list_due_problems(
        &self,
        owner_id: Uuid,
        today: NaiveDate,
        page: u32,
        limit: u32,
    ) -> PortResult<ProblemPage>;

    /// Persists the editable fields (title, link, notes, language) of a problem.
    ///
    /// Fails with `NotFound` if the problem is gone or soft-deleted, and with
    /// `StaleWrite` if it still exists under a newer version.
    async fn update_problem_details(&self, problem: &Problem) -> PortResult<Problem>;

    async fn soft_delete_problem(&self, problem_id: Uuid) -> PortResult<()>;

    // --- Reviews and activity ---

    /// Writes the user, the activity and the problem of one review as a
    /// single atomic unit.
    ///
    /// The user and problem writes must both land or neither does; a
    /// version mismatch on either fails the commit with `StaleWrite`, while a
    /// problem deleted in the meantime fails it with `NotFound`. The
    /// activity append is best-effort: if it alone fails, the rest still
    /// commits and the receipt reports `activity_recorded = false`.
    async fn commit_review(&self, review: &ReviewCommit) -> PortResult<ReviewReceipt>;

    async fn activity_heatmap(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<HeatmapDay>>;
}
