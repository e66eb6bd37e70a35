//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Users and problems carry a `version` column. Every write that started from
//! a read only applies if the version is unchanged, so two racing requests
//! cannot silently overwrite each other.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use recall_core::domain::{
    AccountChanges, HeatmapDay, NewProblem, NewUser, Problem, ProblemPage, ProblemQuery,
    ReviewCommit, ReviewReceipt, User, UserCredentials,
};
use recall_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{Acquire, FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

const USER_COLUMNS: &str =
    "id, name, email, current_streak, last_practiced_at, version, created_at";
const PROBLEM_COLUMNS: &str = "id, user_id, title, link, approach, code, language, \
     current_streak, next_review_date, version, created_at";

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps unique-constraint violations to `Conflict` and everything else to `Unexpected`.
fn write_error(e: sqlx::Error, conflict: &str) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(conflict.to_string())
        }
        _ => unexpected(e),
    }
}

fn not_found(e: sqlx::Error, what: String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        other => unexpected(other),
    }
}

/// Escapes LIKE wildcards so a search term matches literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Explains a versioned problem update that matched no row: the problem is
/// either gone (soft-deleted included) or was changed by someone else.
async fn missing_or_stale<'e, E>(executor: E, problem_id: Uuid) -> PortError
where
    E: sqlx::PgExecutor<'e>,
{
    let live: Result<bool, sqlx::Error> = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM problems WHERE id = $1 AND deleted_at IS NULL)",
    )
    .bind(problem_id)
    .fetch_one(executor)
    .await;
    match live {
        Ok(true) => PortError::StaleWrite(format!("Problem {} changed", problem_id)),
        Ok(false) => PortError::NotFound(format!("Problem {} not found", problem_id)),
        Err(e) => unexpected(e),
    }
}

fn offset_of(page: u32, limit: u32) -> i64 {
    i64::from(page.max(1) - 1) * i64::from(limit)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    current_streak: i32,
    last_practiced_at: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            current_streak: self.current_streak,
            last_practiced_at: self.last_practiced_at,
            version: self.version,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    password_hash: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            email: self.email,
            password_hash: self.password_hash,
        }
    }
}

#[derive(FromRow)]
struct ProblemRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    link: String,
    approach: String,
    code: String,
    language: String,
    current_streak: i32,
    next_review_date: NaiveDate,
    version: i64,
    created_at: DateTime<Utc>,
}
impl ProblemRecord {
    fn to_domain(self) -> Problem {
        Problem {
            id: self.id,
            owner_id: self.user_id,
            title: self.title,
            link: self.link,
            approach: self.approach,
            code: self.code,
            language: self.language,
            current_streak: self.current_streak,
            next_review_date: self.next_review_date,
            version: self.version,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct HeatmapRecord {
    date: NaiveDate,
    count: i64,
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, user: &NewUser) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, name, email, password_hash, session_token_hash) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.session_token_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "email address is already in use"))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, "User not found".to_string()))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_session_hash(&self, token_hash: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE session_token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, "Session not found".to_string()))?;
        Ok(record.to_domain())
    }

    async fn replace_session_hash(&self, user_id: Uuid, token_hash: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET session_token_hash = $1 WHERE id = $2")
            .bind(token_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, "session token collision"))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn update_account(&self, user_id: Uuid, changes: &AccountChanges) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET \
                name = COALESCE($1, name), \
                email = COALESCE($2, email), \
                password_hash = COALESCE($3, password_hash), \
                version = version + 1 \
             WHERE id = $4 RETURNING {USER_COLUMNS}"
        ))
        .bind(changes.name.as_deref())
        .bind(changes.email.as_deref())
        .bind(changes.password_hash.as_deref())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_error(e, "email address is already in use"))?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn create_problem(&self, problem: &NewProblem) -> PortResult<Problem> {
        let record = sqlx::query_as::<_, ProblemRecord>(&format!(
            "INSERT INTO problems \
                (id, user_id, title, link, approach, code, language, next_review_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {PROBLEM_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(problem.owner_id)
        .bind(&problem.title)
        .bind(&problem.link)
        .bind(&problem.approach)
        .bind(&problem.code)
        .bind(&problem.language)
        .bind(problem.next_review_date)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_problem_by_id(&self, problem_id: Uuid) -> PortResult<Problem> {
        let record = sqlx::query_as::<_, ProblemRecord>(&format!(
            "SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(problem_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, format!("Problem {} not found", problem_id)))?;
        Ok(record.to_domain())
    }

    async fn list_problems(&self, owner_id: Uuid, query: &ProblemQuery) -> PortResult<ProblemPage> {
        let pattern = query.search.as_deref().map(like_pattern);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM problems \
             WHERE user_id = $1 AND deleted_at IS NULL AND ($2::text IS NULL OR title ILIKE $2)",
        )
        .bind(owner_id)
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        let records = sqlx::query_as::<_, ProblemRecord>(&format!(
            "SELECT {PROBLEM_COLUMNS} FROM problems \
             WHERE user_id = $1 AND deleted_at IS NULL AND ($2::text IS NULL OR title ILIKE $2) \
             ORDER BY created_at DESC, id LIMIT $3 OFFSET $4"
        ))
        .bind(owner_id)
        .bind(pattern.as_deref())
        .bind(i64::from(query.limit))
        .bind(offset_of(query.page, query.limit))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(ProblemPage {
            problems: records.into_iter().map(|r| r.to_domain()).collect(),
            total: u64::try_from(total).unwrap_or_default(),
            page: query.page,
            limit: query.limit,
        })
    }

    async fn list_due_problems(
        &self,
        owner_id: Uuid,
        today: NaiveDate,
        page: u32,
        limit: u32,
    ) -> PortResult<ProblemPage> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM problems \
             WHERE user_id = $1 AND deleted_at IS NULL AND next_review_date <= $2",
        )
        .bind(owner_id)
        .bind(today)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        let records = sqlx::query_as::<_, ProblemRecord>(&format!(
            "SELECT {PROBLEM_COLUMNS} FROM problems \
             WHERE user_id = $1 AND deleted_at IS NULL AND next_review_date <= $2 \
             ORDER BY next_review_date ASC, id LIMIT $3 OFFSET $4"
        ))
        .bind(owner_id)
        .bind(today)
        .bind(i64::from(limit))
        .bind(offset_of(page, limit))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(ProblemPage {
            problems: records.into_iter().map(|r| r.to_domain()).collect(),
            total: u64::try_from(total).unwrap_or_default(),
            page,
            limit,
        })
    }

    async fn update_problem_details(&self, problem: &Problem) -> PortResult<Problem> {
        let record = sqlx::query_as::<_, ProblemRecord>(&format!(
            "UPDATE problems SET title = $1, link = $2, approach = $3, code = $4, language = $5, \
                version = version + 1 \
             WHERE id = $6 AND version = $7 AND deleted_at IS NULL RETURNING {PROBLEM_COLUMNS}"
        ))
        .bind(&problem.title)
        .bind(&problem.link)
        .bind(&problem.approach)
        .bind(&problem.code)
        .bind(&problem.language)
        .bind(problem.id)
        .bind(problem.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        match record {
            Some(record) => Ok(record.to_domain()),
            None => Err(missing_or_stale(&self.pool, problem.id).await),
        }
    }

    async fn soft_delete_problem(&self, problem_id: Uuid) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE problems SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(problem_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Problem {} not found", problem_id)));
        }
        Ok(())
    }

    async fn commit_review(&self, review: &ReviewCommit) -> PortResult<ReviewReceipt> {
        let user = &review.user;
        let problem = &review.problem;
        let activity = &review.activity;

        // Dropping `tx` without commit rolls every write back.
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let user_record = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET current_streak = $1, last_practiced_at = $2, version = version + 1 \
             WHERE id = $3 AND version = $4 RETURNING {USER_COLUMNS}"
        ))
        .bind(user.current_streak)
        .bind(user.last_practiced_at)
        .bind(user.id)
        .bind(user.version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::StaleWrite(format!("User {} changed", user.id)))?;

        // The activity insert runs under a savepoint so its failure does not
        // poison the surrounding transaction.
        let activity_recorded = {
            let mut savepoint = (&mut *tx).begin().await.map_err(unexpected)?;
            let inserted = sqlx::query(
                "INSERT INTO activities (id, user_id, problem_id, reviewed_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(activity.id)
            .bind(activity.user_id)
            .bind(activity.problem_id)
            .bind(activity.reviewed_at)
            .execute(&mut *savepoint)
            .await;
            match inserted {
                Ok(_) => {
                    savepoint.commit().await.map_err(unexpected)?;
                    true
                }
                Err(e) => {
                    warn!(problem_id = %activity.problem_id, "Failed to record activity: {:?}", e);
                    savepoint.rollback().await.map_err(unexpected)?;
                    false
                }
            }
        };

        let problem_record = sqlx::query_as::<_, ProblemRecord>(&format!(
            "UPDATE problems SET current_streak = $1, next_review_date = $2, version = version + 1 \
             WHERE id = $3 AND version = $4 AND deleted_at IS NULL RETURNING {PROBLEM_COLUMNS}"
        ))
        .bind(problem.current_streak)
        .bind(problem.next_review_date)
        .bind(problem.id)
        .bind(problem.version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;
        let problem_record = match problem_record {
            Some(record) => record,
            None => return Err(missing_or_stale(&mut *tx, problem.id).await),
        };

        tx.commit().await.map_err(unexpected)?;

        Ok(ReviewReceipt {
            user: user_record.to_domain(),
            problem: problem_record.to_domain(),
            activity_recorded,
        })
    }

    async fn activity_heatmap(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<HeatmapDay>> {
        let records = sqlx::query_as::<_, HeatmapRecord>(
            "SELECT (reviewed_at AT TIME ZONE 'UTC')::date AS date, COUNT(*) AS count \
             FROM activities WHERE user_id = $1 AND reviewed_at >= $2 \
             GROUP BY 1 ORDER BY 1 ASC",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records
            .into_iter()
            .map(|r| HeatmapDay {
                date: r.date,
                count: r.count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("two sum"), "%two sum%");
        assert_eq!(like_pattern("100%_done\\"), "%100\\%\\_done\\\\%");
    }

    #[test]
    fn offset_starts_at_zero_for_first_page() {
        assert_eq!(offset_of(1, 10), 0);
        assert_eq!(offset_of(0, 10), 0);
        assert_eq!(offset_of(3, 25), 50);
    }
}
