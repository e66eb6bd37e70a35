//! crates/recall_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Represents a user - used throughout the app.
///
/// Never carries the password hash or the session lookup hash; those only
/// travel through [`UserCredentials`] and [`NewUser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Consecutive calendar days with at least one review.
    pub current_streak: i32,
    pub last_practiced_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every committed write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
}

/// Everything needed to insert a user row. Secrets are already derived.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub session_token_hash: String,
}

/// A partial account update that has already been validated and hashed.
#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

/// A single study item owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub link: String,
    pub approach: String,
    pub code: String,
    pub language: String,
    /// Consecutive "easy" outcomes; drives the review interval.
    pub current_streak: i32,
    pub next_review_date: NaiveDate,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// A problem about to be inserted, with its initial schedule.
#[derive(Debug, Clone)]
pub struct NewProblem {
    pub owner_id: Uuid,
    pub title: String,
    pub link: String,
    pub approach: String,
    pub code: String,
    pub language: String,
    pub next_review_date: NaiveDate,
}

/// Append-only audit record of one review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub problem_id: Uuid,
    pub reviewed_at: DateTime<Utc>,
}

/// How the user felt about a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Easy,
    Hard,
}

impl ReviewOutcome {
    pub fn from_is_easy(is_easy: bool) -> Self {
        if is_easy {
            ReviewOutcome::Easy
        } else {
            ReviewOutcome::Hard
        }
    }
}

/// The three writes of a review, handed to storage as one unit.
///
/// `user` and `problem` carry the version they were read at; storage must
/// reject the whole commit if either row moved in the meantime.
#[derive(Debug, Clone)]
pub struct ReviewCommit {
    pub user: User,
    pub problem: Problem,
    pub activity: Activity,
}

/// What storage actually committed for a review.
#[derive(Debug, Clone)]
pub struct ReviewReceipt {
    pub user: User,
    pub problem: Problem,
    /// False when the activity append failed and was skipped.
    pub activity_recorded: bool,
}

/// Listing parameters for a user's problems.
#[derive(Debug, Clone)]
pub struct ProblemQuery {
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

/// One page of problems plus the number of matching rows overall.
#[derive(Debug, Clone)]
pub struct ProblemPage {
    pub problems: Vec<Problem>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl ProblemPage {
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }
}

/// Number of reviews on a single day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatmapDay {
    pub date: NaiveDate,
    pub count: i64,
}
