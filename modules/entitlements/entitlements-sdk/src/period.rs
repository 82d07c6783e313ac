//! Billing-period boundary arithmetic, always in UTC.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Bucketing of a metered usage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodBoundary {
    /// Calendar month, `[first-of-month 00:00 UTC, first-of-next-month 00:00 UTC)`.
    Month,
    /// Calendar day, `[00:00 UTC, next 00:00 UTC)`.
    Day,
}

/// The current period as a half-open UTC range `[start, end)`.
///
/// Pure over the supplied `now` so boundary cases are directly testable;
/// callers on the live path pass `Utc::now()`.
#[must_use]
pub fn period_range(boundary: PeriodBoundary, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    match boundary {
        PeriodBoundary::Month => {
            // Day 1 and month+1-of-day-1 are always representable; the
            // fallbacks cannot trigger for a date that came from `now`.
            let first = today.with_day(1).unwrap_or(today);
            let next_first = if first.month() == 12 {
                first
                    .with_year(first.year() + 1)
                    .and_then(|date| date.with_month(1))
            } else {
                first.with_month(first.month() + 1)
            }
            .unwrap_or(first);
            (
                first.and_time(NaiveTime::MIN).and_utc(),
                next_first.and_time(NaiveTime::MIN).and_utc(),
            )
        }
        PeriodBoundary::Day => {
            let start = today.and_time(NaiveTime::MIN).and_utc();
            (start, start + Duration::days(1))
        }
    }
}
