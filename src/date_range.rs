//! Inclusive calendar-day windows used by reporting, storage and aggregation.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Longest window the API accepts, in days (inclusive span of a leap year).
pub const MAX_SPAN_DAYS: i64 = 366;

/// Window used when a request omits its dates.
pub const DEFAULT_WINDOW_DAYS: u64 = 30;

/// Inclusive `[start, end]` range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Builds a range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        if start > end {
            return Err(AppError::validation(
                "startDate",
                format!("start date {} is after end date {}", start, end),
            ));
        }
        Ok(Self { start, end })
    }

    /// A single day.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// The `days` days before `end`, up to and including `end`.
    pub fn last_days(end: NaiveDate, days: u64) -> Self {
        let start = end
            .checked_sub_days(Days::new(days))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// `end - start` in days; zero for a single-day range.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Number of calendar days covered.
    pub fn day_count(&self) -> i64 {
        self.span_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// The window immediately before this one: it ends the day before
    /// `start` and spans the same number of days back from there.
    pub fn previous_period(&self) -> Self {
        let end = self.start.pred_opt().unwrap_or(NaiveDate::MIN);
        let start = end
            .checked_sub_days(Days::new(self.span_days().unsigned_abs()))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// Every day in the range, ascending.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |day| *day <= self.end)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rejects_inverted_range() {
        let err = DateRange::new(date(2024, 5, 2), date(2024, 5, 1)).unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "startDate", .. }));
    }

    #[test]
    fn previous_period_has_same_span_and_ends_before_start() {
        let range = DateRange::new(date(2024, 3, 10), date(2024, 3, 16)).unwrap();
        let previous = range.previous_period();

        assert_eq!(previous.end, date(2024, 3, 9));
        assert_eq!(previous.start, date(2024, 3, 3));
        assert_eq!(previous.span_days(), range.span_days());
    }

    #[test]
    fn iter_days_covers_leap_day() {
        let range = DateRange::new(date(2024, 2, 27), date(2024, 3, 1)).unwrap();
        let days: Vec<_> = range.iter_days().collect();

        assert_eq!(days.len() as i64, range.day_count());
        assert_eq!(days[2], date(2024, 2, 29));
    }

    #[test]
    fn last_days_is_inclusive_of_end() {
        let range = DateRange::last_days(date(2024, 1, 31), 30);
        assert_eq!(range.start, date(2024, 1, 1));
        assert_eq!(range.day_count(), 31);
    }
}
