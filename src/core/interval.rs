//! Calendar intervals for the time axis of a series.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Interval granularity of a time series.
///
/// Timestamps are aligned to the start of their interval; month-based
/// intervals step with calendar arithmetic so that yearly and monthly
/// series never drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Year,
    Semiyear,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
}

impl Interval {
    /// Default number of intervals in one seasonal cycle.
    pub fn season_length(&self) -> usize {
        match self {
            Interval::Year => 1,
            Interval::Semiyear => 2,
            Interval::Quarter => 4,
            Interval::Month => 12,
            Interval::Week => 52,
            Interval::Day => 7,
            Interval::Hour => 24,
        }
    }

    /// Interval name as written in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            Interval::Year => "year",
            Interval::Semiyear => "semiyear",
            Interval::Quarter => "quarter",
            Interval::Month => "month",
            Interval::Week => "week",
            Interval::Day => "day",
            Interval::Hour => "hour",
        }
    }

    fn months_per_step(&self) -> Option<u32> {
        match self {
            Interval::Year => Some(12),
            Interval::Semiyear => Some(6),
            Interval::Quarter => Some(3),
            Interval::Month => Some(1),
            _ => None,
        }
    }

    fn fixed_step(&self) -> Duration {
        match self {
            Interval::Week => Duration::weeks(1),
            Interval::Hour => Duration::hours(1),
            _ => Duration::days(1),
        }
    }

    /// Align a timestamp to the start of the interval containing it.
    ///
    /// Weeks start on Monday.
    pub fn align(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        let start = match self.months_per_step() {
            Some(months) => {
                let month0 = (date.month0() / months) * months;
                NaiveDate::from_ymd_opt(date.year(), month0 + 1, 1).unwrap_or(date)
            }
            None => match self {
                Interval::Week => {
                    date - Duration::days(date.weekday().num_days_from_monday() as i64)
                }
                _ => date,
            },
        };

        let time = match self {
            Interval::Hour => NaiveTime::from_hms_opt(ts.hour(), 0, 0).unwrap_or(NaiveTime::MIN),
            _ => NaiveTime::MIN,
        };

        Utc.from_utc_datetime(&start.and_time(time))
    }

    /// Whether `ts` already sits on an interval boundary.
    pub fn is_aligned(&self, ts: DateTime<Utc>) -> bool {
        self.align(ts) == ts
    }

    /// Move an aligned timestamp by `steps` intervals (negative steps go back).
    pub fn advance(&self, ts: DateTime<Utc>, steps: i64) -> Result<DateTime<Utc>> {
        let out_of_range =
            || ForecastError::TimestampError(format!("cannot move {ts} by {steps} {}s", self.name()));

        match self.months_per_step() {
            Some(months) => {
                let total = u32::try_from(steps.unsigned_abs())
                    .ok()
                    .and_then(|s| s.checked_mul(months))
                    .ok_or_else(out_of_range)?;
                let moved = if steps >= 0 {
                    ts.checked_add_months(Months::new(total))
                } else {
                    ts.checked_sub_months(Months::new(total))
                };
                moved.ok_or_else(out_of_range)
            }
            None => {
                let delta = self.fixed_step() * i32::try_from(steps).map_err(|_| out_of_range())?;
                ts.checked_add_signed(delta).ok_or_else(out_of_range)
            }
        }
    }

    /// Number of whole intervals from `from` to `to`, if both are aligned.
    pub fn steps_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<i64> {
        if !self.is_aligned(from) || !self.is_aligned(to) {
            return None;
        }
        match self.months_per_step() {
            Some(months) => {
                let index = |d: DateTime<Utc>| d.year() as i64 * 12 + d.month0() as i64;
                let diff = index(to) - index(from);
                (diff % months as i64 == 0).then_some(diff / months as i64)
            }
            None => {
                let step = self.fixed_step().num_seconds();
                let diff = (to - from).num_seconds();
                (diff % step == 0).then_some(diff / step)
            }
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
