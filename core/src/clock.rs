//! Run clock: the single "now" every window in a run is derived from.
//!
//! All dates are country-local calendar dates. The instant is fixed at
//! construction so every country and every query in a run agree on it.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// An inclusive range of local calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunClock {
    pub now: DateTime<Utc>,
}

impl RunClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn wall() -> Self {
        Self { now: Utc::now() }
    }

    pub fn local_now(&self, offset: FixedOffset) -> DateTime<FixedOffset> {
        self.now.with_timezone(&offset)
    }

    pub fn today(&self, offset: FixedOffset) -> NaiveDate {
        self.local_now(offset).date_naive()
    }

    /// Current local hour. Used as the inclusive cutoff for same-time comparisons.
    pub fn hour_cutoff(&self, offset: FixedOffset) -> u32 {
        self.local_now(offset).hour()
    }

    pub fn same_day_last_week(&self, offset: FixedOffset) -> NaiveDate {
        self.today(offset) - Duration::days(7)
    }

    pub fn month_start(&self, offset: FixedOffset) -> NaiveDate {
        first_of_month(self.today(offset))
    }

    pub fn month_to_date(&self, offset: FixedOffset) -> DateRange {
        DateRange::new(self.month_start(offset), self.today(offset))
    }

    /// First of last month through the same day-of-month, clamped to
    /// the last day of that month (Mar 31 → Feb 28/29).
    pub fn month_to_date_last_month(&self, offset: FixedOffset) -> DateRange {
        let today = self.today(offset);
        let last_month_end = first_of_month(today) - Duration::days(1);
        let start = first_of_month(last_month_end);
        let day = today.day().min(last_month_end.day());
        let end = start.with_day(day).unwrap_or(last_month_end);
        DateRange::new(start, end)
    }

    /// The trailing window used for the daily trend series, today included.
    pub fn history(&self, offset: FixedOffset, days: u32) -> DateRange {
        let today = self.today(offset);
        let back = i64::from(days.saturating_sub(1));
        DateRange::new(today - Duration::days(back), today)
    }
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}
