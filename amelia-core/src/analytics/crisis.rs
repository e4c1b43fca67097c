//! Crisis events: positive crisis classifications, most recent first.

use crate::db::CrisisRow;

/// Keep rows flagged `is_crisis == true`, newest first.
///
/// Rows with the same `created_at` keep their input order.
pub fn crisis_events(rows: &[CrisisRow]) -> Vec<CrisisRow> {
    let mut events: Vec<CrisisRow> = rows
        .iter()
        .filter(|r| r.content.is_crisis())
        .cloned()
        .collect();
    // sort_by is stable
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::parse_timestamp;
    use crate::types::CrisisContent;

    fn row(id: i64, at: &str, is_crisis: Option<bool>) -> CrisisRow {
        CrisisRow {
            insight_id: id,
            conversation_id: 1,
            created_at: parse_timestamp(at).unwrap(),
            content: CrisisContent {
                is_crisis,
                risk_level: Some("high".to_string()),
                indicators: vec!["hopelessness".to_string()],
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_only_positive_flags_count() {
        let rows = vec![
            row(1, "2025-08-15T10:00:00Z", Some(false)),
            row(2, "2025-08-15T11:00:00Z", None),
            row(3, "2025-08-15T12:00:00Z", Some(true)),
        ];
        let events = crisis_events(&rows);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].insight_id, 3);
    }

    #[test]
    fn test_sorted_descending_with_stable_ties() {
        let rows = vec![
            row(1, "2025-08-14T10:00:00Z", Some(true)),
            row(2, "2025-08-16T10:00:00Z", Some(true)),
            row(3, "2025-08-15T10:00:00Z", Some(true)),
            row(4, "2025-08-16T10:00:00Z", Some(true)),
        ];
        let ids: Vec<_> = crisis_events(&rows).iter().map(|r| r.insight_id).collect();
        assert_eq!(ids, vec![2, 4, 3, 1]);
    }
}
