//! crates/recall_core/src/memory.rs
//!
//! An in-memory `DatabaseService` and a settable clock for tests.
//!
//! The store keeps the same contract as the PostgreSQL adapter (unique
//! emails and session hashes, versioned rows, soft deletes, atomic review
//! commits) and lets a test make individual writes fail.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::calendar::Clock;
use crate::domain::{
    AccountChanges, Activity, HeatmapDay, NewProblem, NewUser, Problem, ProblemPage, ProblemQuery,
    ReviewCommit, ReviewReceipt, User, UserCredentials,
};
use crate::ports::{DatabaseService, PortError, PortResult};

/// Which writes the store should refuse.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailurePlan {
    pub fail_user_write: bool,
    pub fail_problem_write: bool,
    pub fail_activity_write: bool,
}

struct UserRow {
    user: User,
    password_hash: String,
    session_token_hash: String,
}

struct ProblemRow {
    problem: Problem,
    deleted: bool,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRow>,
    problems: HashMap<Uuid, ProblemRow>,
    activities: Vec<Activity>,
}

#[derive(Default)]
pub struct InMemoryDatabase {
    tables: Mutex<Tables>,
    failures: Mutex<FailurePlan>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failures(&self, plan: FailurePlan) {
        if let Ok(mut failures) = self.failures.lock() {
            *failures = plan;
        }
    }

    fn failures(&self) -> FailurePlan {
        self.failures.lock().map(|f| *f).unwrap_or_default()
    }

    fn lock(&self) -> PortResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| PortError::Unexpected("in-memory store poisoned".to_string()))
    }

    // --- Inspection and seeding helpers ---

    pub fn activities_for(&self, user_id: Uuid) -> Vec<Activity> {
        self.lock()
            .map(|t| {
                t.activities
                    .iter()
                    .filter(|a| a.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn session_hash_of(&self, user_id: Uuid) -> Option<String> {
        let tables = self.lock().ok()?;
        tables.users.get(&user_id).map(|r| r.session_token_hash.clone())
    }

    pub fn password_hash_of(&self, user_id: Uuid) -> Option<String> {
        let tables = self.lock().ok()?;
        tables.users.get(&user_id).map(|r| r.password_hash.clone())
    }

    /// Overwrites a user's practice state, as if earlier reviews happened.
    pub fn seed_practice(
        &self,
        user_id: Uuid,
        streak: i32,
        last_practiced_at: Option<DateTime<Utc>>,
    ) {
        if let Ok(mut tables) = self.lock() {
            if let Some(row) = tables.users.get_mut(&user_id) {
                row.user.current_streak = streak;
                row.user.last_practiced_at = last_practiced_at;
            }
        }
    }

    /// Overwrites a problem's schedule.
    pub fn seed_schedule(&self, problem_id: Uuid, streak: i32, next_review_date: NaiveDate) {
        if let Ok(mut tables) = self.lock() {
            if let Some(row) = tables.problems.get_mut(&problem_id) {
                row.problem.current_streak = streak;
                row.problem.next_review_date = next_review_date;
            }
        }
    }
}

fn paginate(mut problems: Vec<Problem>, page: u32, limit: u32) -> ProblemPage {
    let total = problems.len() as u64;
    let page = page.max(1);
    let skip = (page as usize - 1).saturating_mul(limit as usize);
    let problems = problems.drain(..).skip(skip).take(limit as usize).collect();
    ProblemPage {
        problems,
        total,
        page,
        limit,
    }
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn create_user(&self, user: &NewUser) -> PortResult<User> {
        let mut tables = self.lock()?;
        if tables.users.values().any(|r| r.user.email == user.email) {
            return Err(PortError::Conflict("email address is already in use".to_string()));
        }
        if tables
            .users
            .values()
            .any(|r| r.session_token_hash == user.session_token_hash)
        {
            return Err(PortError::Conflict("session token collision".to_string()));
        }
        let created = User {
            id: Uuid::new_v4(),
            name: user.name.clone(),
            email: user.email.clone(),
            current_streak: 0,
            last_practiced_at: None,
            version: 0,
            created_at: Utc::now(),
        };
        tables.users.insert(
            created.id,
            UserRow {
                user: created.clone(),
                password_hash: user.password_hash.clone(),
                session_token_hash: user.session_token_hash.clone(),
            },
        );
        Ok(created)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let tables = self.lock()?;
        tables
            .users
            .get(&user_id)
            .map(|r| r.user.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let tables = self.lock()?;
        tables
            .users
            .values()
            .find(|r| r.user.email == email)
            .map(|r| UserCredentials {
                user_id: r.user.id,
                email: r.user.email.clone(),
                password_hash: r.password_hash.clone(),
            })
            .ok_or_else(|| PortError::NotFound("User not found".to_string()))
    }

    async fn get_user_by_session_hash(&self, token_hash: &str) -> PortResult<User> {
        let tables = self.lock()?;
        tables
            .users
            .values()
            .find(|r| r.session_token_hash == token_hash)
            .map(|r| r.user.clone())
            .ok_or_else(|| PortError::NotFound("Session not found".to_string()))
    }

    async fn replace_session_hash(&self, user_id: Uuid, token_hash: &str) -> PortResult<()> {
        let mut tables = self.lock()?;
        if tables
            .users
            .iter()
            .any(|(id, r)| *id != user_id && r.session_token_hash == token_hash)
        {
            return Err(PortError::Conflict("session token collision".to_string()));
        }
        let row = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        row.session_token_hash = token_hash.to_string();
        Ok(())
    }

    async fn update_account(&self, user_id: Uuid, changes: &AccountChanges) -> PortResult<User> {
        let mut tables = self.lock()?;
        if let Some(email) = &changes.email {
            if tables
                .users
                .iter()
                .any(|(id, r)| *id != user_id && &r.user.email == email)
            {
                return Err(PortError::Conflict("email address is already in use".to_string()));
            }
        }
        let row = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        if let Some(name) = &changes.name {
            row.user.name = name.clone();
        }
        if let Some(email) = &changes.email {
            row.user.email = email.clone();
        }
        if let Some(hash) = &changes.password_hash {
            row.password_hash = hash.clone();
        }
        row.user.version += 1;
        Ok(row.user.clone())
    }

    async fn create_problem(&self, problem: &NewProblem) -> PortResult<Problem> {
        let mut tables = self.lock()?;
        let created = Problem {
            id: Uuid::new_v4(),
            owner_id: problem.owner_id,
            title: problem.title.clone(),
            link: problem.link.clone(),
            approach: problem.approach.clone(),
            code: problem.code.clone(),
            language: problem.language.clone(),
            current_streak: 0,
            next_review_date: problem.next_review_date,
            version: 0,
            created_at: Utc::now(),
        };
        tables.problems.insert(
            created.id,
            ProblemRow {
                problem: created.clone(),
                deleted: false,
            },
        );
        Ok(created)
    }

    async fn get_problem_by_id(&self, problem_id: Uuid) -> PortResult<Problem> {
        let tables = self.lock()?;
        tables
            .problems
            .get(&problem_id)
            .filter(|r| !r.deleted)
            .map(|r| r.problem.clone())
            .ok_or_else(|| PortError::NotFound(format!("Problem {} not found", problem_id)))
    }

    async fn list_problems(&self, owner_id: Uuid, query: &ProblemQuery) -> PortResult<ProblemPage> {
        let tables = self.lock()?;
        let needle = query.search.as_ref().map(|s| s.to_lowercase());
        let mut problems: Vec<Problem> = tables
            .problems
            .values()
            .filter(|r| !r.deleted && r.problem.owner_id == owner_id)
            .filter(|r| match &needle {
                Some(n) => r.problem.title.to_lowercase().contains(n),
                None => true,
            })
            .map(|r| r.problem.clone())
            .collect();
        problems.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(problems, query.page, query.limit))
    }

    async fn list_due_problems(
        &self,
        owner_id: Uuid,
        today: NaiveDate,
        page: u32,
        limit: u32,
    ) -> PortResult<ProblemPage> {
        let tables = self.lock()?;
        let mut problems: Vec<Problem> = tables
            .problems
            .values()
            .filter(|r| {
                !r.deleted && r.problem.owner_id == owner_id && r.problem.next_review_date <= today
            })
            .map(|r| r.problem.clone())
            .collect();
        problems.sort_by(|a, b| {
            a.next_review_date
                .cmp(&b.next_review_date)
                .then(a.id.cmp(&b.id))
        });
        Ok(paginate(problems, page, limit))
    }

    async fn update_problem_details(&self, problem: &Problem) -> PortResult<Problem> {
        let mut tables = self.lock()?;
        let row = tables
            .problems
            .get_mut(&problem.id)
            .filter(|r| !r.deleted)
            .ok_or_else(|| PortError::NotFound(format!("Problem {} not found", problem.id)))?;
        if row.problem.version != problem.version {
            return Err(PortError::StaleWrite(format!("Problem {} changed", problem.id)));
        }
        row.problem.title = problem.title.clone();
        row.problem.link = problem.link.clone();
        row.problem.approach = problem.approach.clone();
        row.problem.code = problem.code.clone();
        row.problem.language = problem.language.clone();
        row.problem.version += 1;
        Ok(row.problem.clone())
    }

    async fn soft_delete_problem(&self, problem_id: Uuid) -> PortResult<()> {
        let mut tables = self.lock()?;
        match tables.problems.get_mut(&problem_id) {
            Some(row) if !row.deleted => {
                row.deleted = true;
                Ok(())
            }
            _ => Err(PortError::NotFound(format!("Problem {} not found", problem_id))),
        }
    }

    async fn commit_review(&self, review: &ReviewCommit) -> PortResult<ReviewReceipt> {
        let failures = self.failures();
        let mut tables = self.lock()?;

        // Stage every write first; nothing touches `tables` until all succeed.
        let stored_user = tables
            .users
            .get(&review.user.id)
            .map(|r| r.user.version)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", review.user.id)))?;
        if stored_user != review.user.version {
            return Err(PortError::StaleWrite(format!("User {} changed", review.user.id)));
        }
        if failures.fail_user_write {
            return Err(PortError::Unexpected("injected user write failure".to_string()));
        }
        let mut user = review.user.clone();
        user.version += 1;

        let activity_recorded = !failures.fail_activity_write;

        let stored_problem = tables
            .problems
            .get(&review.problem.id)
            .filter(|r| !r.deleted)
            .map(|r| r.problem.version)
            .ok_or_else(|| {
                PortError::NotFound(format!("Problem {} not found", review.problem.id))
            })?;
        if stored_problem != review.problem.version {
            return Err(PortError::StaleWrite(format!("Problem {} changed", review.problem.id)));
        }
        if failures.fail_problem_write {
            return Err(PortError::Unexpected("injected problem write failure".to_string()));
        }
        let mut problem = review.problem.clone();
        problem.version += 1;

        if let Some(row) = tables.users.get_mut(&user.id) {
            row.user = user.clone();
        }
        if activity_recorded {
            tables.activities.push(review.activity.clone());
        }
        if let Some(row) = tables.problems.get_mut(&problem.id) {
            row.problem = problem.clone();
        }

        Ok(ReviewReceipt {
            user,
            problem,
            activity_recorded,
        })
    }

    async fn activity_heatmap(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<HeatmapDay>> {
        let tables = self.lock()?;
        let mut days: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for activity in tables
            .activities
            .iter()
            .filter(|a| a.user_id == user_id && a.reviewed_at >= since)
        {
            *days.entry(activity.reviewed_at.date_naive()).or_default() += 1;
        }
        Ok(days
            .into_iter()
            .map(|(date, count)| HeatmapDay { date, count })
            .collect())
    }
}

//=========================================================================================
// FixedClock
//=========================================================================================

/// A clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut current) = self.now.lock() {
            *current = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut current) = self.now.lock() {
            *current += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|n| *n).unwrap_or_else(|p| *p.into_inner())
    }
}
