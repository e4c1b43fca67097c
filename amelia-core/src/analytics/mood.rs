//! Mood metrics: overall average and the per-day series.
//!
//! A score counts only when it is a number within [0, 10]. When an
//! allow-list of classification types is configured, rows whose
//! `classification_type` is missing or not listed are ignored as well.
//! Zero is a legitimate score, so "no data" is always `None`, never `0`.

use super::{round_to_tenth, DailyPoint, DateRange};
use crate::db::MoodRow;
use chrono::NaiveDate;
use std::collections::HashMap;

/// The score of a row if it passes validation and the allow-list.
pub fn valid_mood_score(row: &MoodRow, allowed_types: &[String]) -> Option<f64> {
    if !allowed_types.is_empty() {
        let listed = row
            .content
            .classification_type
            .as_ref()
            .is_some_and(|t| allowed_types.iter().any(|a| a == t));
        if !listed {
            return None;
        }
    }
    row.content.valid_score()
}

/// Mean of all valid scores, rounded to one decimal.
pub fn average_mood(rows: &[MoodRow], allowed_types: &[String]) -> Option<f64> {
    let scores: Vec<f64> = rows
        .iter()
        .filter_map(|r| valid_mood_score(r, allowed_types))
        .collect();
    mean(&scores).map(round_to_tenth)
}

/// One point per day of `range` with that day's mean score, or `None`.
///
/// Day means are not rounded; rounding is left to display. A score belongs to the day its conversation started on (see
/// [`MoodRow::bucket_time`]).
pub fn daily_mood_series(
    rows: &[MoodRow],
    range: &DateRange,
    allowed_types: &[String],
) -> Vec<DailyPoint<Option<f64>>> {
    let mut by_day: HashMap<NaiveDate, Vec<f64>> = HashMap::new();
    for row in rows {
        if let Some(score) = valid_mood_score(row, allowed_types) {
            by_day
                .entry(row.bucket_time().date_naive())
                .or_default()
                .push(score);
        }
    }

    range
        .days()
        .map(|day| {
            let value = by_day.get(&day).and_then(|scores| mean(scores));
            DailyPoint::new(day, value)
        })
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::parse_timestamp;
    use crate::types::MoodContent;
    use serde_json::json;

    fn row(started: &str, score: serde_json::Value, kind: Option<&str>) -> MoodRow {
        MoodRow {
            created_at: parse_timestamp(started).unwrap(),
            conversation_started_at: parse_timestamp(started),
            content: MoodContent {
                mood_score: Some(score),
                classification_type: kind.map(str::to_string),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_average_bounds_and_rounding() {
        let rows = vec![
            row("2025-08-15T10:00:00Z", json!(0), None),
            row("2025-08-15T10:00:00Z", json!(10), None),
            row("2025-08-15T10:00:00Z", json!(10.1), None),
            row("2025-08-15T10:00:00Z", json!(-0.1), None),
            row("2025-08-15T10:00:00Z", json!("5"), None),
        ];
        assert_eq!(average_mood(&rows, &[]), Some(5.0));

        let rows = vec![
            row("2025-08-15T10:00:00Z", json!(7), None),
            row("2025-08-15T10:00:00Z", json!(8), None),
        ];
        assert_eq!(average_mood(&rows, &[]), Some(7.5));

        let rows = vec![
            row("2025-08-15T10:00:00Z", json!(6.96), None),
            row("2025-08-15T10:00:00Z", json!(7.04), None),
        ];
        assert_eq!(average_mood(&rows, &[]), Some(7.0));
    }

    #[test]
    fn test_average_absent_is_none() {
        assert_eq!(average_mood(&[], &[]), None);
        let rows = vec![row("2025-08-15T10:00:00Z", json!(11), None)];
        assert_eq!(average_mood(&rows, &[]), None);
    }

    #[test]
    fn test_allow_list_filters_types() {
        let allowed = vec!["session_mood".to_string()];
        let rows = vec![
            row("2025-08-15T10:00:00Z", json!(2), Some("session_mood")),
            row("2025-08-15T10:00:00Z", json!(9), Some("baseline")),
            row("2025-08-15T10:00:00Z", json!(9), None),
        ];
        assert_eq!(average_mood(&rows, &allowed), Some(2.0));
        assert_eq!(average_mood(&rows, &[]), Some(6.7));
    }

    #[test]
    fn test_daily_series_has_a_point_per_day() {
        let rows = vec![
            row("2025-08-15T09:00:00Z", json!(6), None),
            row("2025-08-17T09:00:00Z", json!(4), None),
            row("2025-08-17T20:00:00Z", json!(8), None),
        ];
        let range = DateRange::parse("2025-08-15", "2025-08-17").unwrap();
        let series = daily_mood_series(&rows, &range, &[]);

        let values: Vec<_> = series.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(6.0), None, Some(6.0)]);
        let labels: Vec<_> = series.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["08/15", "08/16", "08/17"]);
    }

    #[test]
    fn test_daily_mean_is_unrounded() {
        let rows = vec![
            row("2025-08-15T09:00:00Z", json!(7), None),
            row("2025-08-15T12:00:00Z", json!(7), None),
            row("2025-08-15T18:00:00Z", json!(8), None),
        ];
        let range = DateRange::parse("2025-08-15", "2025-08-15").unwrap();
        let series = daily_mood_series(&rows, &range, &[]);

        let day = series[0].value.unwrap();
        assert!((day - 22.0 / 3.0).abs() < 1e-9);
        // The overall average is still rounded
        assert_eq!(average_mood(&rows, &[]), Some(7.3));
    }

    #[test]
    fn test_bucket_prefers_conversation_start() {
        let mut late = row("2025-08-16T00:30:00Z", json!(3), None);
        late.conversation_started_at = parse_timestamp("2025-08-15T23:50:00Z");
        let mut orphan = row("2025-08-16T08:00:00Z", json!(9), None);
        orphan.conversation_started_at = None;

        let range = DateRange::parse("2025-08-15", "2025-08-16").unwrap();
        let values: Vec<_> = daily_mood_series(&[late, orphan], &range, &[])
            .into_iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(values, vec![Some(3.0), Some(9.0)]);
    }
}
