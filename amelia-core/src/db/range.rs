//! Patient/date-range queries feeding the dashboard metrics.
//!
//! Every query is bounded by [`DateRange::bounds`], i.e. the first
//! millisecond of `from` through the last millisecond of `to`, UTC.
//! Conversations are selected by their whole window: they must start on or
//! after `from` and have their last message on or before `to`. A
//! conversation without any message yet has no `last_message_at` and never
//! matches. Insights are selected through their parent conversation.

use super::repo::{get_json, get_opt_ts, get_ts, Database, Entity};
use crate::analytics::DateRange;
use crate::error::Result;
use crate::types::{
    Conversation, CrisisContent, InsightContent, InsightKind, MessageSender, MoodContent,
    PrimaryEmotionsContent,
};
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

/// A completed insight together with its parent conversation's window.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightRow {
    pub insight_id: i64,
    pub conversation_id: i64,
    pub created_at: DateTime<Utc>,
    pub conversation_started_at: Option<DateTime<Utc>>,
    pub conversation_last_message_at: Option<DateTime<Utc>>,
    pub content: InsightContent,
}

/// A mood insight ready for averaging and daily bucketing.
#[derive(Debug, Clone, PartialEq)]
pub struct MoodRow {
    pub created_at: DateTime<Utc>,
    pub conversation_started_at: Option<DateTime<Utc>>,
    pub content: MoodContent,
}

impl MoodRow {
    /// Timestamp that decides which day the score belongs to.
    ///
    /// The conversation start wins; the insight's own creation time is only
    /// used when the row was built without a conversation.
    pub fn bucket_time(&self) -> DateTime<Utc> {
        self.conversation_started_at.unwrap_or(self.created_at)
    }
}

/// A crisis classification as listed on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrisisRow {
    pub insight_id: i64,
    pub conversation_id: i64,
    pub created_at: DateTime<Utc>,
    pub content: CrisisContent,
}

impl Database {
    /// Conversations of a patient whose whole window lies inside the range,
    /// oldest first.
    pub fn conversations_in_range(
        &self,
        patient_id: &str,
        range: &DateRange,
    ) -> Result<Vec<Conversation>> {
        let (from, to) = range.bounds();
        let conn = self.connection();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM conversations
            WHERE patient_id = ?1
              AND started_at >= ?2
              AND last_message_at <= ?3
            ORDER BY started_at ASC, id ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![patient_id, from, to], Conversation::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        tracing::debug!(patient_id, %range, count = rows.len(), "Conversations in range");
        Ok(rows)
    }

    /// Creation times of a patient's messages inside the range, oldest first.
    ///
    /// With `sender` set only that side of the conversation is returned.
    pub fn message_timestamps_in_range(
        &self,
        patient_id: &str,
        range: &DateRange,
        sender: Option<MessageSender>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let (from, to) = range.bounds();
        let conn = self.connection();
        let mut stmt = conn.prepare(
            r#"
            SELECT created_at FROM messages
            WHERE patient_id = ?1
              AND created_at >= ?2
              AND created_at <= ?3
              AND (?4 IS NULL OR sender = ?4)
            ORDER BY created_at ASC
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![patient_id, from, to, sender.map(|s| s.as_str())],
                |row| get_ts(row, "created_at"),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Completed insights of one kind whose conversation lies inside the
    /// range, newest first.
    pub fn insights_in_range(
        &self,
        patient_id: &str,
        range: &DateRange,
        kind: InsightKind,
    ) -> Result<Vec<InsightRow>> {
        let (from, to) = range.bounds();
        let type_key = kind.type_key();
        let conn = self.connection();
        let mut stmt = conn.prepare(
            r#"
            SELECT ci.id              AS insight_id,
                   ci.conversation_id AS conversation_id,
                   ci.created_at      AS created_at,
                   ci.content         AS content,
                   c.started_at       AS started_at,
                   c.last_message_at  AS last_message_at
            FROM conversation_insights ci
            JOIN conversations c ON c.id = ci.conversation_id
            JOIN insight_types it ON it.id = ci.insight_type_id
            WHERE c.patient_id = ?1
              AND ci.completed = 1
              AND it.type_key = ?2
              AND c.started_at >= ?3
              AND c.last_message_at <= ?4
            ORDER BY ci.created_at DESC, ci.id DESC
            "#,
        )?;
        let rows = stmt
            .query_map(params![patient_id, type_key, from, to], |row| {
                Ok(InsightRow {
                    insight_id: row.get("insight_id")?,
                    conversation_id: row.get("conversation_id")?,
                    created_at: get_ts(row, "created_at")?,
                    conversation_started_at: get_opt_ts(row, "started_at")?,
                    conversation_last_message_at: get_opt_ts(row, "last_message_at")?,
                    content: InsightContent::decode(type_key, get_json(row, "content")?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        tracing::debug!(patient_id, %range, type_key, count = rows.len(), "Insights in range");
        Ok(rows)
    }

    /// Mood insights in the range. Payloads that failed to decode are skipped.
    pub fn mood_rows_in_range(&self, patient_id: &str, range: &DateRange) -> Result<Vec<MoodRow>> {
        Ok(self
            .insights_in_range(patient_id, range, InsightKind::MoodClassification)?
            .into_iter()
            .filter_map(|row| match row.content {
                InsightContent::Mood(content) => Some(MoodRow {
                    created_at: row.created_at,
                    conversation_started_at: row.conversation_started_at,
                    content,
                }),
                _ => None,
            })
            .collect())
    }

    /// Crisis classifications in the range, positive or not.
    pub fn crisis_rows_in_range(
        &self,
        patient_id: &str,
        range: &DateRange,
    ) -> Result<Vec<CrisisRow>> {
        Ok(self
            .insights_in_range(patient_id, range, InsightKind::CrisisClassification)?
            .into_iter()
            .filter_map(|row| match row.content {
                InsightContent::Crisis(content) => Some(CrisisRow {
                    insight_id: row.insight_id,
                    conversation_id: row.conversation_id,
                    created_at: row.created_at,
                    content,
                }),
                _ => None,
            })
            .collect())
    }

    /// Primary-emotion payloads in the range.
    pub fn emotion_contents_in_range(
        &self,
        patient_id: &str,
        range: &DateRange,
    ) -> Result<Vec<PrimaryEmotionsContent>> {
        Ok(self
            .insights_in_range(patient_id, range, InsightKind::PrimaryEmotions)?
            .into_iter()
            .filter_map(|row| match row.content {
                InsightContent::PrimaryEmotions(content) => Some(content),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::parse_timestamp;
    use crate::types::{ConversationStatus, Insight, InsightType, Message, Profile, UserRole};
    use chrono::NaiveDate;
    use serde_json::json;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn range(from: &str, to: &str) -> DateRange {
        DateRange::parse(from, to).unwrap()
    }

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db.repo::<Profile>()
            .create(&Profile {
                id: "p1".to_string(),
                full_name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                phone: None,
                role: UserRole::Patient,
                avatar_url: None,
                created_at: ts("2025-08-01T00:00:00Z"),
                updated_at: None,
            })
            .unwrap();
        for (id, key) in [
            (1, "mood_classification"),
            (2, "crisis_classification"),
            (3, "primary_emotions"),
        ] {
            db.repo::<InsightType>()
                .create(&InsightType {
                    id,
                    type_key: key.to_string(),
                    display_name: key.to_string(),
                    is_active: true,
                    config: None,
                    created_at: ts("2025-08-01T00:00:00Z"),
                })
                .unwrap();
        }
        db
    }

    fn conversation(db: &Database, started: &str, last: Option<&str>) -> i64 {
        db.repo::<Conversation>()
            .create(&Conversation {
                id: 0,
                patient_id: "p1".to_string(),
                started_at: ts(started),
                last_message_at: last.map(ts),
                status: ConversationStatus::Closed,
                summary: None,
                created_at: ts(started),
                updated_at: None,
            })
            .unwrap()
            .id
    }

    fn insight(
        db: &Database,
        conversation_id: i64,
        type_id: i64,
        completed: bool,
        content: serde_json::Value,
        created: &str,
    ) {
        let type_key = match type_id {
            1 => "mood_classification",
            2 => "crisis_classification",
            _ => "primary_emotions",
        };
        db.repo::<Insight>()
            .create(&Insight {
                id: 0,
                conversation_id,
                insight_type_id: type_id,
                completed,
                content: InsightContent::decode(type_key, Some(content)),
                created_at: ts(created),
                updated_at: None,
            })
            .unwrap();
    }

    #[test]
    fn test_conversations_must_fit_window() {
        let db = seeded_db();
        conversation(&db, "2025-08-15T09:00:00Z", Some("2025-08-15T09:30:00Z"));
        // Ends after the range
        conversation(&db, "2025-08-17T23:50:00Z", Some("2025-08-18T00:10:00Z"));
        // Started before the range
        conversation(&db, "2025-08-14T23:50:00Z", Some("2025-08-15T00:10:00Z"));
        // No messages yet
        conversation(&db, "2025-08-16T10:00:00Z", None);

        let found = db
            .conversations_in_range("p1", &range("2025-08-15", "2025-08-17"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].started_at, ts("2025-08-15T09:00:00Z"));

        assert!(db
            .conversations_in_range("other", &range("2025-08-15", "2025-08-17"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_message_timestamps_sender_filter() {
        let db = seeded_db();
        let repo = db.repo::<Message>();
        for (sender, at) in [
            (MessageSender::Patient, "2025-08-15T08:00:00Z"),
            (MessageSender::Agent, "2025-08-15T08:01:00Z"),
            (MessageSender::Patient, "2025-08-17T23:59:59.999Z"),
            (MessageSender::Patient, "2025-08-18T00:00:00Z"),
        ] {
            repo.create(&Message {
                id: 0,
                conversation_id: None,
                patient_id: "p1".to_string(),
                sender,
                content: "hola".to_string(),
                created_at: ts(at),
            })
            .unwrap();
        }

        let r = range("2025-08-15", "2025-08-17");
        assert_eq!(db.message_timestamps_in_range("p1", &r, None).unwrap().len(), 3);
        let patient = db
            .message_timestamps_in_range("p1", &r, Some(MessageSender::Patient))
            .unwrap();
        assert_eq!(
            patient,
            vec![ts("2025-08-15T08:00:00Z"), ts("2025-08-17T23:59:59.999Z")]
        );
    }

    #[test]
    fn test_insights_filtered_by_kind_completion_and_window() {
        let db = seeded_db();
        let inside = conversation(&db, "2025-08-15T09:00:00Z", Some("2025-08-15T09:30:00Z"));
        let outside = conversation(&db, "2025-08-10T09:00:00Z", Some("2025-08-10T09:30:00Z"));

        insight(&db, inside, 1, true, json!({"mood_score": 6}), "2025-08-15T09:31:00Z");
        insight(&db, inside, 1, false, json!({"mood_score": 2}), "2025-08-15T09:32:00Z");
        insight(&db, outside, 1, true, json!({"mood_score": 9}), "2025-08-15T09:33:00Z");
        insight(&db, inside, 2, true, json!({"is_crisis": true}), "2025-08-15T09:34:00Z");

        let r = range("2025-08-15", "2025-08-17");
        let moods = db.mood_rows_in_range("p1", &r).unwrap();
        assert_eq!(moods.len(), 1);
        assert_eq!(moods[0].content.valid_score(), Some(6.0));
        assert_eq!(
            moods[0].bucket_time().date_naive(),
            NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()
        );

        let crises = db.crisis_rows_in_range("p1", &r).unwrap();
        assert_eq!(crises.len(), 1);
        assert!(crises[0].content.is_crisis());
        assert_eq!(crises[0].conversation_id, inside);

        assert!(db.emotion_contents_in_range("p1", &r).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_payload_skipped_by_typed_wrapper() {
        let db = seeded_db();
        let conv = conversation(&db, "2025-08-15T09:00:00Z", Some("2025-08-15T09:30:00Z"));
        insight(
            &db,
            conv,
            3,
            true,
            json!({"primary_emotions": "not a list"}),
            "2025-08-15T09:31:00Z",
        );
        insight(
            &db,
            conv,
            3,
            true,
            json!({"primary_emotions": [{"emotion": "joy", "intensity": 7}]}),
            "2025-08-15T09:32:00Z",
        );

        let r = range("2025-08-15", "2025-08-15");
        let raw = db
            .insights_in_range("p1", &r, InsightKind::PrimaryEmotions)
            .unwrap();
        assert_eq!(raw.len(), 2);
        // Newest first
        assert!(matches!(raw[0].content, InsightContent::PrimaryEmotions(_)));
        assert!(matches!(raw[1].content, InsightContent::Other(_)));

        let contents = db.emotion_contents_in_range("p1", &r).unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].primary_emotions[0].intensity, Some(7.0));
    }
}
