//! crates/recall_core/src/review.rs
//!
//! Applies one review outcome to a problem, its owner and the activity log.
//!
//! Two independent counters move here. The user streak counts consecutive
//! calendar days with any review and rises at most once per day. The
//! problem streak counts consecutive "easy" outcomes and sets how many days
//! pass until the problem is due again; a "hard" outcome resets it.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::calendar::Calendar;
use crate::domain::{Activity, Problem, ReviewCommit, ReviewOutcome};
use crate::error::{ServiceError, ServiceResult};
use crate::ports::DatabaseService;

/// User streak after a review at `now`, given the previous practice time.
///
/// A practice time that lies in the future (clock skew) counts as today.
pub fn next_user_streak(
    current: i32,
    last_practiced_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    calendar: &Calendar,
) -> i32 {
    let Some(last) = last_practiced_at else {
        return 1;
    };
    let today = calendar.day_of(now);
    let last_day = calendar.day_of(last);
    match today.pred_opt() {
        _ if last_day >= today => current.max(1),
        Some(yesterday) if last_day == yesterday => current.saturating_add(1),
        _ => 1,
    }
}

/// New `(streak, next_review_date)` for a problem reviewed on `today`.
///
/// The interval grows linearly: after the n-th consecutive easy review the
/// problem is due again in n days.
pub fn next_schedule(
    current_streak: i32,
    outcome: ReviewOutcome,
    today: NaiveDate,
) -> (i32, NaiveDate) {
    let streak = match outcome {
        ReviewOutcome::Easy => current_streak.max(0).saturating_add(1),
        ReviewOutcome::Hard => 0,
    };
    let interval = u64::try_from(streak.max(1)).unwrap_or(1);
    let next = today.checked_add_days(Days::new(interval)).unwrap_or(NaiveDate::MAX);
    (streak, next)
}

pub struct ReviewEngine {
    db: Arc<dyn DatabaseService>,
    calendar: Calendar,
}

impl ReviewEngine {
    pub fn new(db: Arc<dyn DatabaseService>, calendar: Calendar) -> Self {
        Self { db, calendar }
    }

    /// Records a review of `problem_id` by `caller_id`.
    ///
    /// A problem owned by somebody else is reported as `NotFound`. The user,
    /// activity and problem writes are committed together; if that commit
    /// fails nothing is visible.
    pub async fn review(
        &self,
        problem_id: Uuid,
        caller_id: Uuid,
        outcome: ReviewOutcome,
    ) -> ServiceResult<Problem> {
        let mut problem = self.db.get_problem_by_id(problem_id).await?;
        if problem.owner_id != caller_id {
            debug!(
                problem_id = %problem_id,
                caller_id = %caller_id,
                "review of foreign problem masked as not found"
            );
            return Err(ServiceError::NotFound);
        }
        let mut user = self.db.get_user_by_id(caller_id).await?;

        let now = self.calendar.now();
        let today = self.calendar.day_of(now);

        user.current_streak =
            next_user_streak(user.current_streak, user.last_practiced_at, now, &self.calendar);
        user.last_practiced_at = Some(now);

        let activity = Activity {
            id: Uuid::new_v4(),
            user_id: user.id,
            problem_id: problem.id,
            reviewed_at: now,
        };

        let (streak, next_review_date) = next_schedule(problem.current_streak, outcome, today);
        problem.current_streak = streak;
        problem.next_review_date = next_review_date;

        let receipt = self
            .db
            .commit_review(&ReviewCommit {
                user,
                problem,
                activity,
            })
            .await?;

        if !receipt.activity_recorded {
            warn!(
                problem_id = %problem_id,
                user_id = %caller_id,
                "review committed without an activity record"
            );
        }
        info!(
            problem_id = %problem_id,
            outcome = ?outcome,
            problem_streak = receipt.problem.current_streak,
            user_streak = receipt.user.current_streak,
            next_review_date = %receipt.problem.next_review_date,
            "problem reviewed"
        );
        Ok(receipt.problem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Clock;
    use crate::domain::{NewProblem, NewUser, User};
    use crate::memory::{FailurePlan, FixedClock, InMemoryDatabase};
    use chrono::{Duration, FixedOffset, TimeZone};

    struct Fixture {
        store: Arc<InMemoryDatabase>,
        clock: Arc<FixedClock>,
        engine: ReviewEngine,
        user: User,
        problem: Problem,
    }

    fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc_calendar(clock: Arc<FixedClock>) -> Calendar {
        Calendar::new(clock, FixedOffset::east_opt(0).unwrap())
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryDatabase::new());
        let clock = Arc::new(FixedClock::new(noon(2024, 3, 10)));
        let db: Arc<dyn DatabaseService> = store.clone();
        let user = db
            .create_user(&NewUser {
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "hash".to_string(),
                session_token_hash: "session".to_string(),
            })
            .await
            .unwrap();
        let problem = db
            .create_problem(&NewProblem {
                owner_id: user.id,
                title: "Two Sum".to_string(),
                link: "https://leetcode.com/problems/two-sum/".to_string(),
                approach: String::new(),
                code: String::new(),
                language: "rust".to_string(),
                next_review_date: date(2024, 3, 11),
            })
            .await
            .unwrap();
        let engine = ReviewEngine::new(db, utc_calendar(clock.clone()));
        Fixture {
            store,
            clock,
            engine,
            user,
            problem,
        }
    }

    #[test]
    fn user_streak_rules() {
        let calendar = utc_calendar(Arc::new(FixedClock::new(noon(2024, 3, 10))));
        let now = noon(2024, 3, 10);
        assert_eq!(next_user_streak(0, None, now, &calendar), 1);
        assert_eq!(next_user_streak(3, Some(noon(2024, 3, 9)), now, &calendar), 4);
        assert_eq!(next_user_streak(3, Some(now - Duration::hours(1)), now, &calendar), 3);
        assert_eq!(next_user_streak(3, Some(noon(2024, 3, 8)), now, &calendar), 1);
        assert_eq!(next_user_streak(3, Some(noon(2024, 3, 11)), now, &calendar), 3);
    }

    #[test]
    fn user_streak_follows_the_configured_day_boundary() {
        // 23:30 UTC on the 9th is already the 10th at UTC+2.
        let plus_two = Calendar::new(
            Arc::new(FixedClock::new(noon(2024, 3, 10))),
            FixedOffset::east_opt(2 * 3600).unwrap(),
        );
        let last = Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap();
        let now = noon(2024, 3, 10);
        assert_eq!(next_user_streak(5, Some(last), now, &plus_two), 5);

        let utc = utc_calendar(Arc::new(FixedClock::new(now)));
        assert_eq!(next_user_streak(5, Some(last), now, &utc), 6);
    }

    #[test]
    fn schedule_rules() {
        let today = date(2024, 3, 10);
        assert_eq!(next_schedule(2, ReviewOutcome::Easy, today), (3, date(2024, 3, 13)));
        assert_eq!(next_schedule(2, ReviewOutcome::Hard, today), (0, date(2024, 3, 11)));
        assert_eq!(next_schedule(0, ReviewOutcome::Easy, today), (1, date(2024, 3, 11)));
    }

    #[tokio::test]
    async fn easy_review_advances_both_streaks() {
        let f = fixture().await;
        f.store.seed_practice(f.user.id, 3, Some(noon(2024, 3, 9)));
        f.store.seed_schedule(f.problem.id, 2, date(2024, 3, 10));

        let reviewed = f
            .engine
            .review(f.problem.id, f.user.id, ReviewOutcome::Easy)
            .await
            .unwrap();
        assert_eq!(reviewed.current_streak, 3);
        assert_eq!(reviewed.next_review_date, date(2024, 3, 13));

        let user = f.engine.db.get_user_by_id(f.user.id).await.unwrap();
        assert_eq!(user.current_streak, 4);
        assert_eq!(user.last_practiced_at, Some(noon(2024, 3, 10)));
        assert_eq!(f.store.activities_for(f.user.id).len(), 1);
    }

    #[tokio::test]
    async fn hard_review_resets_problem_streak() {
        let f = fixture().await;
        f.store.seed_schedule(f.problem.id, 2, date(2024, 3, 10));

        let reviewed = f
            .engine
            .review(f.problem.id, f.user.id, ReviewOutcome::Hard)
            .await
            .unwrap();
        assert_eq!(reviewed.current_streak, 0);
        assert_eq!(reviewed.next_review_date, date(2024, 3, 11));
    }

    #[tokio::test]
    async fn second_review_same_day_keeps_user_streak() {
        let f = fixture().await;
        f.store.seed_practice(f.user.id, 3, Some(noon(2024, 3, 9)));

        f.engine
            .review(f.problem.id, f.user.id, ReviewOutcome::Easy)
            .await
            .unwrap();
        f.clock.advance(Duration::hours(2));
        f.engine
            .review(f.problem.id, f.user.id, ReviewOutcome::Easy)
            .await
            .unwrap();

        let user = f.engine.db.get_user_by_id(f.user.id).await.unwrap();
        assert_eq!(user.current_streak, 4);
        assert_eq!(user.last_practiced_at, Some(noon(2024, 3, 10) + Duration::hours(2)));
        assert_eq!(f.store.activities_for(f.user.id).len(), 2);
    }

    #[tokio::test]
    async fn broken_streak_restarts_at_one() {
        let f = fixture().await;
        f.store.seed_practice(f.user.id, 9, Some(noon(2024, 3, 1)));
        f.engine
            .review(f.problem.id, f.user.id, ReviewOutcome::Hard)
            .await
            .unwrap();
        let user = f.engine.db.get_user_by_id(f.user.id).await.unwrap();
        assert_eq!(user.current_streak, 1);
    }

    #[tokio::test]
    async fn foreign_problem_is_not_found() {
        let f = fixture().await;
        let stranger = Uuid::new_v4();
        let foreign = f
            .engine
            .review(f.problem.id, stranger, ReviewOutcome::Easy)
            .await;
        let missing = f
            .engine
            .review(Uuid::new_v4(), f.user.id, ReviewOutcome::Easy)
            .await;
        assert!(matches!(foreign, Err(ServiceError::NotFound)));
        assert!(matches!(missing, Err(ServiceError::NotFound)));

        let untouched = f.engine.db.get_problem_by_id(f.problem.id).await.unwrap();
        assert_eq!(untouched, f.problem);
    }

    #[tokio::test]
    async fn failed_problem_write_leaves_user_untouched() {
        let f = fixture().await;
        f.store.seed_practice(f.user.id, 3, Some(noon(2024, 3, 9)));
        f.store.set_failures(FailurePlan {
            fail_problem_write: true,
            ..Default::default()
        });

        let result = f
            .engine
            .review(f.problem.id, f.user.id, ReviewOutcome::Easy)
            .await;
        assert!(matches!(result, Err(ServiceError::Internal(_))));

        let user = f.engine.db.get_user_by_id(f.user.id).await.unwrap();
        assert_eq!(user.current_streak, 3);
        assert_eq!(user.last_practiced_at, Some(noon(2024, 3, 9)));
        assert!(f.store.activities_for(f.user.id).is_empty());
        let problem = f.engine.db.get_problem_by_id(f.problem.id).await.unwrap();
        assert_eq!(problem.current_streak, 0);
    }

    #[tokio::test]
    async fn failed_user_write_leaves_problem_untouched() {
        let f = fixture().await;
        f.store.set_failures(FailurePlan {
            fail_user_write: true,
            ..Default::default()
        });

        let result = f
            .engine
            .review(f.problem.id, f.user.id, ReviewOutcome::Easy)
            .await;
        assert!(matches!(result, Err(ServiceError::Internal(_))));

        let problem = f.engine.db.get_problem_by_id(f.problem.id).await.unwrap();
        assert_eq!(problem, f.problem);
        assert!(f.store.activities_for(f.user.id).is_empty());
        let user = f.engine.db.get_user_by_id(f.user.id).await.unwrap();
        assert_eq!(user.current_streak, 0);
        assert_eq!(user.last_practiced_at, None);
    }

    #[tokio::test]
    async fn failed_activity_write_is_tolerated() {
        let f = fixture().await;
        f.store.set_failures(FailurePlan {
            fail_activity_write: true,
            ..Default::default()
        });

        let reviewed = f
            .engine
            .review(f.problem.id, f.user.id, ReviewOutcome::Easy)
            .await
            .unwrap();
        assert_eq!(reviewed.current_streak, 1);
        assert!(f.store.activities_for(f.user.id).is_empty());
        let user = f.engine.db.get_user_by_id(f.user.id).await.unwrap();
        assert_eq!(user.current_streak, 1);
    }

    #[tokio::test]
    async fn stale_problem_version_is_a_conflict() {
        let f = fixture().await;
        let mut stale = f.problem.clone();
        stale.current_streak = 7;
        let user = f.engine.db.get_user_by_id(f.user.id).await.unwrap();

        // Someone else commits first.
        f.engine
            .review(f.problem.id, f.user.id, ReviewOutcome::Easy)
            .await
            .unwrap();

        let late = f
            .engine
            .db
            .commit_review(&ReviewCommit {
                user,
                problem: stale,
                activity: Activity {
                    id: Uuid::new_v4(),
                    user_id: f.user.id,
                    problem_id: f.problem.id,
                    reviewed_at: f.clock.now(),
                },
            })
            .await;
        assert!(matches!(
            late.map_err(ServiceError::from),
            Err(ServiceError::Conflict(_))
        ));
        let problem = f.engine.db.get_problem_by_id(f.problem.id).await.unwrap();
        assert_eq!(problem.current_streak, 1);
    }
}
