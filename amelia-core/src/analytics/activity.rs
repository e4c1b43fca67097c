//! Session activity: conversations started per day.

use super::{DailyPoint, DateRange};
use crate::types::Conversation;
use chrono::NaiveDate;
use std::collections::HashMap;

/// One point per day of `range` with the number of conversations started
/// that day.
pub fn daily_conversation_counts(
    conversations: &[Conversation],
    range: &DateRange,
) -> Vec<DailyPoint<usize>> {
    let mut by_day: HashMap<NaiveDate, usize> = HashMap::new();
    for conversation in conversations {
        *by_day
            .entry(conversation.started_at.date_naive())
            .or_default() += 1;
    }

    range
        .days()
        .map(|day| DailyPoint::new(day, by_day.get(&day).copied().unwrap_or(0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::parse_timestamp;
    use crate::types::ConversationStatus;

    fn conversation(started: &str) -> Conversation {
        let started_at = parse_timestamp(started).unwrap();
        Conversation {
            id: 1,
            patient_id: "p1".to_string(),
            started_at,
            last_message_at: Some(started_at),
            status: ConversationStatus::Closed,
            summary: None,
            created_at: started_at,
            updated_at: None,
        }
    }

    #[test]
    fn test_counts_fill_every_day() {
        let conversations = vec![
            conversation("2025-08-11T09:00:00Z"),
            conversation("2025-08-11T18:00:00Z"),
            conversation("2025-08-14T09:00:00Z"),
        ];
        let range = DateRange::parse("2025-08-11", "2025-08-17").unwrap();
        let counts: Vec<_> = daily_conversation_counts(&conversations, &range)
            .into_iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(counts, vec![2, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_empty_input() {
        let range = DateRange::parse("2025-08-15", "2025-08-15").unwrap();
        let series = daily_conversation_counts(&[], &range);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].value, 0);
        assert_eq!(series[0].label, "08/15");
    }
}
