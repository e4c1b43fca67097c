//! Date ranges selected on the dashboard.

use crate::error::{Error, Result};
use crate::format::format_timestamp;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest range accepted, in days. Ten years of daily points.
pub const MAX_RANGE_DAYS: u32 = 3660;

/// Inclusive range of calendar days, `from` through `to`.
///
/// Constructed unchecked with [`DateRange::new`] by callers that already
/// validated their input; [`DateRange::parse`] rejects inverted ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// Parse two `YYYY-MM-DD` strings.
    pub fn parse(from: &str, to: &str) -> Result<Self> {
        let parse_day = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|e| Error::InvalidDateRange(format!("{:?}: {}", s, e)))
        };
        let range = Self::new(parse_day(from)?, parse_day(to)?);
        if range.from > range.to {
            return Err(Error::InvalidDateRange(format!(
                "start {} is after end {}",
                range.from, range.to
            )));
        }
        if range.num_days() > i64::from(MAX_RANGE_DAYS) {
            return Err(Error::InvalidDateRange(format!(
                "{} spans {} days, more than {}",
                range,
                range.num_days(),
                MAX_RANGE_DAYS
            )));
        }
        Ok(range)
    }

    /// The `days` calendar days ending at `end`, inclusive.
    pub fn last_days(end: NaiveDate, days: u32) -> Result<Self> {
        let from = end
            .checked_sub_signed(span(days)?)
            .ok_or_else(|| Error::InvalidDateRange(format!("{} days before {}", days, end)))?;
        Ok(Self::new(from, end))
    }

    /// The `days` calendar days starting at `start`, inclusive.
    pub fn first_days(start: NaiveDate, days: u32) -> Result<Self> {
        let to = start
            .checked_add_signed(span(days)?)
            .ok_or_else(|| Error::InvalidDateRange(format!("{} days after {}", days, start)))?;
        Ok(Self::new(start, to))
    }

    /// Number of calendar days covered, never less than one.
    pub fn num_days(&self) -> i64 {
        ((self.to - self.from).num_days() + 1).max(1)
    }

    /// Every day in the range, in order. Empty for an inverted range.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let to = self.to;
        self.from.iter_days().take_while(move |d| *d <= to)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from <= day && day <= self.to
    }

    /// First instant of `from`, UTC.
    pub fn start(&self) -> DateTime<Utc> {
        self.from.and_time(NaiveTime::MIN).and_utc()
    }

    /// Last millisecond of `to`, UTC.
    pub fn end(&self) -> DateTime<Utc> {
        (self.to.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::milliseconds(1))
            .and_utc()
    }

    /// `[start, end]` in the stored timestamp format.
    pub fn bounds(&self) -> (String, String) {
        (format_timestamp(self.start()), format_timestamp(self.end()))
    }
}

/// Distance from the first to the last day of a `days`-long range.
fn span(days: u32) -> Result<Duration> {
    if days > MAX_RANGE_DAYS {
        return Err(Error::InvalidDateRange(format!(
            "{} days is more than {}",
            days, MAX_RANGE_DAYS
        )));
    }
    Ok(Duration::days(i64::from(days.max(1)) - 1))
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}
