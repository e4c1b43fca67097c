//! Engagement rate: share of days in a range with patient activity.

use super::DateRange;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Percentage (0-100) of calendar days in `range` on which at least one of
/// `timestamps` falls.
///
/// Days are UTC calendar days. Timestamps outside the range are ignored, so
/// the result never exceeds 100.
pub fn engagement_percentage(timestamps: &[DateTime<Utc>], range: &DateRange) -> u32 {
    let active_days: HashSet<_> = timestamps
        .iter()
        .map(|ts| ts.date_naive())
        .filter(|day| range.contains(*day))
        .collect();

    if active_days.is_empty() {
        return 0;
    }

    let total_days = range.num_days() as f64;
    (100.0 * active_days.len() as f64 / total_days).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::parse_timestamp;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_three_of_seven_days() {
        let range = DateRange::parse("2025-08-11", "2025-08-17").unwrap();
        let timestamps = vec![
            ts("2025-08-11T08:00:00Z"),
            ts("2025-08-11T21:00:00Z"),
            ts("2025-08-13T10:00:00Z"),
            ts("2025-08-17T23:59:59.999Z"),
        ];
        assert_eq!(engagement_percentage(&timestamps, &range), 43);
    }

    #[test]
    fn test_no_messages_is_zero() {
        let range = DateRange::parse("2025-08-11", "2025-08-17").unwrap();
        assert_eq!(engagement_percentage(&[], &range), 0);
    }

    #[test]
    fn test_single_day_range() {
        let range = DateRange::parse("2025-08-15", "2025-08-15").unwrap();
        assert_eq!(
            engagement_percentage(&[ts("2025-08-15T12:00:00Z")], &range),
            100
        );
    }

    #[test]
    fn test_out_of_range_days_ignored() {
        let range = DateRange::parse("2025-08-15", "2025-08-16").unwrap();
        let timestamps = vec![
            ts("2025-08-14T23:59:59Z"),
            ts("2025-08-15T00:00:00Z"),
            ts("2025-08-17T00:00:00Z"),
        ];
        assert_eq!(engagement_percentage(&timestamps, &range), 50);
    }
}
