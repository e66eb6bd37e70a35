//! crates/recall_core/src/calendar.rs
//!
//! Wall-clock access and the reference day boundary used for streaks and
//! due dates.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock plus the UTC offset whose midnight starts a new day.
#[derive(Clone)]
pub struct Calendar {
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl Calendar {
    pub fn new(clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self { clock, offset }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.day_of(self.now())
    }

    /// The calendar day an instant falls on at this calendar's offset.
    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }
}
