//! crates/recall_core/src/problems.rs
//!
//! Problem CRUD and the due queue. Every operation is scoped to the caller:
//! a problem owned by somebody else behaves exactly like a missing one.

use std::sync::Arc;

use chrono::Days;
use tracing::{debug, info};
use uuid::Uuid;

use crate::calendar::Calendar;
use crate::domain::{NewProblem, Problem, ProblemPage, ProblemQuery};
use crate::error::{ServiceError, ServiceResult};
use crate::ports::DatabaseService;
use crate::validation::{
    problem_create_checks, problem_update_checks, ProblemDraft, ValidationPipeline,
};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Fields supplied when creating a problem.
#[derive(Debug, Clone, Default)]
pub struct ProblemInput {
    pub title: String,
    pub link: String,
    pub approach: String,
    pub code: String,
    pub language: String,
}

/// A partial edit; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProblemPatch {
    pub title: Option<String>,
    pub link: Option<String>,
    pub approach: Option<String>,
    pub code: Option<String>,
    pub language: Option<String>,
}

pub struct ProblemService {
    db: Arc<dyn DatabaseService>,
    calendar: Calendar,
    create_checks: ValidationPipeline<ProblemDraft>,
    update_checks: ValidationPipeline<ProblemDraft>,
}

impl ProblemService {
    pub fn new(db: Arc<dyn DatabaseService>, calendar: Calendar) -> Self {
        Self {
            db,
            calendar,
            create_checks: problem_create_checks(),
            update_checks: problem_update_checks(),
        }
    }

    /// Creates a problem with streak 0, due tomorrow.
    pub async fn create(&self, owner_id: Uuid, input: ProblemInput) -> ServiceResult<Problem> {
        let mut draft = ProblemDraft {
            owner_id,
            title: input.title,
            link: input.link,
            approach: input.approach,
            code: input.code,
            language: input.language,
        };
        self.create_checks.run(&mut draft)?;

        let today = self.calendar.today();
        let next_review_date = today
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ServiceError::Internal("review date out of range".to_string()))?;

        let problem = self
            .db
            .create_problem(&NewProblem {
                owner_id: draft.owner_id,
                title: draft.title,
                link: draft.link,
                approach: draft.approach,
                code: draft.code,
                language: draft.language,
                next_review_date,
            })
            .await?;
        info!(problem_id = %problem.id, owner_id = %owner_id, "problem created");
        Ok(problem)
    }

    pub async fn show(&self, problem_id: Uuid, caller_id: Uuid) -> ServiceResult<Problem> {
        let problem = self.db.get_problem_by_id(problem_id).await?;
        if problem.owner_id != caller_id {
            debug!(
                problem_id = %problem_id,
                caller_id = %caller_id,
                "foreign problem masked as not found"
            );
            return Err(ServiceError::NotFound);
        }
        Ok(problem)
    }

    /// Newest first, optionally filtered by a case-insensitive title search.
    pub async fn list(
        &self,
        caller_id: Uuid,
        search: Option<String>,
        page: u32,
        limit: u32,
    ) -> ServiceResult<ProblemPage> {
        let (page, limit) = page_bounds(page, limit);
        let query = ProblemQuery {
            search: search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            page,
            limit,
        };
        Ok(self.db.list_problems(caller_id, &query).await?)
    }

    /// Problems due today or earlier, most overdue first.
    pub async fn due(&self, caller_id: Uuid, page: u32, limit: u32) -> ServiceResult<ProblemPage> {
        let (page, limit) = page_bounds(page, limit);
        let today = self.calendar.today();
        Ok(self
            .db
            .list_due_problems(caller_id, today, page, limit)
            .await?)
    }

    /// Applies the provided fields. The owner and the schedule are never
    /// changed by an edit.
    pub async fn update(
        &self,
        problem_id: Uuid,
        caller_id: Uuid,
        patch: ProblemPatch,
    ) -> ServiceResult<Problem> {
        let mut problem = self.show(problem_id, caller_id).await?;

        let mut draft = ProblemDraft {
            owner_id: problem.owner_id,
            title: patch.title.unwrap_or(problem.title),
            link: patch.link.unwrap_or(problem.link),
            approach: patch.approach.unwrap_or(problem.approach),
            code: patch.code.unwrap_or(problem.code),
            language: patch.language.unwrap_or(problem.language),
        };
        self.update_checks.run(&mut draft)?;

        problem.title = draft.title;
        problem.link = draft.link;
        problem.approach = draft.approach;
        problem.code = draft.code;
        problem.language = draft.language;

        let updated = self.db.update_problem_details(&problem).await?;
        info!(problem_id = %problem_id, "problem updated");
        Ok(updated)
    }

    /// Hides the problem from listings; its activity history stays.
    pub async fn delete(&self, problem_id: Uuid, caller_id: Uuid) -> ServiceResult<()> {
        self.show(problem_id, caller_id).await?;
        self.db.soft_delete_problem(problem_id).await?;
        info!(problem_id = %problem_id, "problem deleted");
        Ok(())
    }
}

fn page_bounds(page: u32, limit: u32) -> (u32, u32) {
    let page = page.max(1);
    let limit = match limit {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    };
    (page, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReviewOutcome;
    use crate::memory::{FixedClock, InMemoryDatabase};
    use crate::review::ReviewEngine;
    use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};

    struct Fixture {
        clock: Arc<FixedClock>,
        db: Arc<dyn DatabaseService>,
        problems: ProblemService,
        calendar: Calendar,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap()));
        let db: Arc<dyn DatabaseService> = Arc::new(InMemoryDatabase::new());
        let calendar = Calendar::new(clock.clone(), FixedOffset::east_opt(0).unwrap());
        Fixture {
            clock,
            problems: ProblemService::new(db.clone(), calendar.clone()),
            db,
            calendar,
        }
    }

    fn input(title: &str) -> ProblemInput {
        ProblemInput {
            title: title.to_string(),
            link: format!(
                "https://leetcode.com/problems/{}/",
                title.to_lowercase().replace(' ', "-")
            ),
            language: "rust".to_string(),
            ..Default::default()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn new_problem_starts_at_zero_and_is_due_tomorrow() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let problem = f.problems.create(owner, input("Two Sum")).await.unwrap();
        assert_eq!(problem.owner_id, owner);
        assert_eq!(problem.current_streak, 0);
        assert_eq!(problem.next_review_date, date(2024, 3, 11));
    }

    #[tokio::test]
    async fn create_runs_validation() {
        let f = fixture();
        let mut bad = input("Two Sum");
        bad.link = "leetcode two sum".to_string();
        assert!(matches!(
            f.problems.create(Uuid::new_v4(), bad).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            f.problems.create(Uuid::nil(), input("Two Sum")).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn other_users_cannot_see_edit_or_delete() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let problem = f.problems.create(owner, input("Two Sum")).await.unwrap();

        assert!(matches!(f.problems.show(problem.id, stranger).await, Err(ServiceError::NotFound)));
        assert!(matches!(
            f.problems.update(problem.id, stranger, ProblemPatch::default()).await,
            Err(ServiceError::NotFound)
        ));
        assert!(matches!(
            f.problems.delete(problem.id, stranger).await,
            Err(ServiceError::NotFound)
        ));
        assert!(f.problems.show(problem.id, owner).await.is_ok());
    }

    #[tokio::test]
    async fn update_changes_only_provided_fields() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let problem = f.problems.create(owner, input("Two Sum")).await.unwrap();

        let updated = f
            .problems
            .update(
                problem.id,
                owner,
                ProblemPatch {
                    approach: Some("hash map of complements".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Two Sum");
        assert_eq!(updated.approach, "hash map of complements");
        assert_eq!(updated.next_review_date, problem.next_review_date);

        let cleared = f
            .problems
            .update(
                problem.id,
                owner,
                ProblemPatch {
                    title: Some(String::new()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(cleared, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn deleted_problem_disappears_but_keeps_activity() {
        let f = fixture();
        let store = Arc::new(InMemoryDatabase::new());
        let db: Arc<dyn DatabaseService> = store.clone();
        let problems = ProblemService::new(db.clone(), f.calendar.clone());
        let reviews = ReviewEngine::new(db.clone(), f.calendar.clone());
        let owner = db
            .create_user(&crate::domain::NewUser {
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "hash".to_string(),
                session_token_hash: "session".to_string(),
            })
            .await
            .unwrap();

        let problem = problems.create(owner.id, input("Two Sum")).await.unwrap();
        reviews.review(problem.id, owner.id, ReviewOutcome::Easy).await.unwrap();
        problems.delete(problem.id, owner.id).await.unwrap();

        assert!(matches!(problems.show(problem.id, owner.id).await, Err(ServiceError::NotFound)));
        assert_eq!(problems.list(owner.id, None, 1, 10).await.unwrap().total, 0);
        assert_eq!(store.activities_for(owner.id).len(), 1);
        assert!(matches!(
            reviews.review(problem.id, owner.id, ReviewOutcome::Easy).await,
            Err(ServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn writes_racing_a_delete_report_not_found() {
        let f = fixture();
        let owner = f
            .db
            .create_user(&crate::domain::NewUser {
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "hash".to_string(),
                session_token_hash: "session".to_string(),
            })
            .await
            .unwrap();
        let problem = f.problems.create(owner.id, input("Two Sum")).await.unwrap();

        // Both writes were prepared from a read taken before the delete.
        let mut edited = problem.clone();
        edited.title = "Two Sum II".to_string();
        let commit = crate::domain::ReviewCommit {
            user: owner.clone(),
            problem: problem.clone(),
            activity: crate::domain::Activity {
                id: Uuid::new_v4(),
                user_id: owner.id,
                problem_id: problem.id,
                reviewed_at: f.calendar.now(),
            },
        };
        f.problems.delete(problem.id, owner.id).await.unwrap();

        assert!(matches!(
            f.db.update_problem_details(&edited).await,
            Err(crate::ports::PortError::NotFound(_))
        ));
        assert!(matches!(
            f.db.commit_review(&commit).await,
            Err(crate::ports::PortError::NotFound(_))
        ));
        let user = f.db.get_user_by_id(owner.id).await.unwrap();
        assert_eq!(user.version, owner.version);
    }

    #[tokio::test]
    async fn edit_from_an_old_read_is_stale() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let problem = f.problems.create(owner, input("Two Sum")).await.unwrap();
        let patch = ProblemPatch {
            code: Some("fn main() {}".to_string()),
            ..Default::default()
        };
        f.problems.update(problem.id, owner, patch).await.unwrap();

        assert!(matches!(
            f.db.update_problem_details(&problem).await,
            Err(crate::ports::PortError::StaleWrite(_))
        ));
    }

    #[tokio::test]
    async fn list_searches_and_paginates_newest_first() {
        let f = fixture();
        let owner = Uuid::new_v4();
        for title in ["Two Sum", "Three Sum", "Valid Parentheses"] {
            f.problems.create(owner, input(title)).await.unwrap();
        }
        f.problems.create(Uuid::new_v4(), input("Four Sum")).await.unwrap();

        let sums = f
            .problems
            .list(owner, Some("sum".to_string()), 1, 10)
            .await
            .unwrap();
        assert_eq!(sums.total, 2);

        let first = f.problems.list(owner, None, 1, 2).await.unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.problems.len(), 2);
        assert_eq!(first.total_pages(), 2);
        let second = f.problems.list(owner, None, 2, 2).await.unwrap();
        assert_eq!(second.problems.len(), 1);

        let defaulted = f.problems.list(owner, None, 0, 0).await.unwrap();
        assert_eq!((defaulted.page, defaulted.limit), (1, DEFAULT_PAGE_SIZE));
    }

    #[tokio::test]
    async fn due_queue_holds_problems_due_today_or_earlier() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let a = f.problems.create(owner, input("Two Sum")).await.unwrap();
        f.clock.advance(Duration::days(1));
        let b = f.problems.create(owner, input("Three Sum")).await.unwrap();

        // Today is the 11th: `a` is due, `b` is due tomorrow.
        let due = f.problems.due(owner, 1, 10).await.unwrap();
        assert_eq!(due.total, 1);
        assert_eq!(due.problems[0].id, a.id);

        f.clock.advance(Duration::days(3));
        let due = f.problems.due(owner, 1, 10).await.unwrap();
        let ids: Vec<Uuid> = due.problems.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert!(f.db.get_problem_by_id(b.id).await.is_ok());
    }
}
