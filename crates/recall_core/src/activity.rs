//! crates/recall_core/src/activity.rs
//!
//! Read side of the activity log.

use std::sync::Arc;

use chrono::Months;
use uuid::Uuid;

use crate::calendar::Calendar;
use crate::domain::HeatmapDay;
use crate::error::{ServiceError, ServiceResult};
use crate::ports::DatabaseService;
use crate::validation::ValidationError;

pub const DEFAULT_HEATMAP_MONTHS: u32 = 6;

pub struct ActivityService {
    db: Arc<dyn DatabaseService>,
    calendar: Calendar,
}

impl ActivityService {
    pub fn new(db: Arc<dyn DatabaseService>, calendar: Calendar) -> Self {
        Self { db, calendar }
    }

    /// Review counts per day over the last `months` months, oldest first.
    /// A missing or non-positive window falls back to six months.
    pub async fn heatmap(
        &self,
        user_id: Uuid,
        months: Option<i64>,
    ) -> ServiceResult<Vec<HeatmapDay>> {
        let months = months
            .filter(|m| *m > 0)
            .and_then(|m| u32::try_from(m).ok())
            .unwrap_or(DEFAULT_HEATMAP_MONTHS);
        let since = self
            .calendar
            .now()
            .checked_sub_months(Months::new(months))
            .ok_or_else(|| ServiceError::Validation(ValidationError::new("months out of range")))?;
        Ok(self.db.activity_heatmap(user_id, since).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Clock;
    use crate::domain::{NewProblem, NewUser, ReviewOutcome};
    use crate::memory::{FixedClock, InMemoryDatabase};
    use crate::review::ReviewEngine;
    use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};

    #[tokio::test]
    async fn heatmap_counts_reviews_per_day_inside_the_window() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()));
        let calendar = Calendar::new(clock.clone(), FixedOffset::east_opt(0).unwrap());
        let db: Arc<dyn DatabaseService> = Arc::new(InMemoryDatabase::new());
        let reviews = ReviewEngine::new(db.clone(), calendar.clone());
        let activity = ActivityService::new(db.clone(), calendar);

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
                language: String::new(),
                next_review_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            })
            .await
            .unwrap();

        // One review in January, then two on a single day in May.
        reviews.review(problem.id, user.id, ReviewOutcome::Easy).await.unwrap();
        clock.set(Utc.with_ymd_and_hms(2024, 5, 20, 8, 0, 0).unwrap());
        reviews.review(problem.id, user.id, ReviewOutcome::Hard).await.unwrap();
        clock.advance(Duration::hours(3));
        reviews.review(problem.id, user.id, ReviewOutcome::Easy).await.unwrap();
        clock.set(clock.now() + Duration::days(1));

        let last_two_months = activity.heatmap(user.id, Some(2)).await.unwrap();
        assert_eq!(
            last_two_months,
            vec![HeatmapDay {
                date: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
                count: 2
            }]
        );

        let defaulted = activity.heatmap(user.id, Some(-3)).await.unwrap();
        assert_eq!(defaulted.len(), 2);
        assert_eq!(defaulted[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }
}
