//! Patient summary card and the full dashboard report.
//!
//! Both are assembled from the range queries in [`crate::db::range`] and
//! the pure aggregations of this module's siblings.

use super::{
    activity::daily_conversation_counts, aggregate_emotions, average_mood, crisis_events,
    daily_mood_series, engagement_percentage, DailyPoint, DateRange, EmotionSummary,
};
use crate::config::AnalyticsConfig;
use crate::db::{CrisisRow, Database};
use crate::error::Result;
use crate::types::MessageSender;
use serde::Serialize;

/// Headline metrics for one patient and range.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatientSummary {
    /// Conversations whose window lies inside the range
    pub total_sessions: usize,
    /// Positive crisis classifications
    pub crisis_events: usize,
    /// Mean valid mood score, one decimal
    pub average_mood: Option<f64>,
    /// Percentage of days with a patient message
    pub engagement_rate: u32,
}

/// Everything the dashboard shows for one patient and range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub patient_id: String,
    pub range: DateRange,
    pub summary: PatientSummary,
    pub mood_series: Vec<DailyPoint<Option<f64>>>,
    pub conversation_counts: Vec<DailyPoint<usize>>,
    pub crisis_events: Vec<CrisisRow>,
    pub emotions: Vec<EmotionSummary>,
}

/// Compute the summary card.
pub fn generate_summary(
    db: &Database,
    patient_id: &str,
    range: &DateRange,
    config: &AnalyticsConfig,
) -> Result<PatientSummary> {
    let total_sessions = db.conversations_in_range(patient_id, range)?.len();
    let crisis_count = crisis_events(&db.crisis_rows_in_range(patient_id, range)?).len();
    let moods = db.mood_rows_in_range(patient_id, range)?;
    let timestamps =
        db.message_timestamps_in_range(patient_id, range, Some(MessageSender::Patient))?;

    Ok(PatientSummary {
        total_sessions,
        crisis_events: crisis_count,
        average_mood: average_mood(&moods, &config.mood_classification_types),
        engagement_rate: engagement_percentage(&timestamps, range),
    })
}

/// Compute every dashboard metric in one pass over the store.
pub fn generate_dashboard(
    db: &Database,
    patient_id: &str,
    range: &DateRange,
    config: &AnalyticsConfig,
) -> Result<DashboardReport> {
    let allowed = &config.mood_classification_types;

    let conversations = db.conversations_in_range(patient_id, range)?;
    let moods = db.mood_rows_in_range(patient_id, range)?;
    let crises = crisis_events(&db.crisis_rows_in_range(patient_id, range)?);
    let emotions = aggregate_emotions(&db.emotion_contents_in_range(patient_id, range)?);
    let timestamps =
        db.message_timestamps_in_range(patient_id, range, Some(MessageSender::Patient))?;

    let summary = PatientSummary {
        total_sessions: conversations.len(),
        crisis_events: crises.len(),
        average_mood: average_mood(&moods, allowed),
        engagement_rate: engagement_percentage(&timestamps, range),
    };

    tracing::info!(
        patient_id,
        %range,
        sessions = summary.total_sessions,
        crisis_events = summary.crisis_events,
        "Generated dashboard"
    );

    Ok(DashboardReport {
        patient_id: patient_id.to_string(),
        range: *range,
        summary,
        mood_series: daily_mood_series(&moods, range, allowed),
        conversation_counts: daily_conversation_counts(&conversations, range),
        crisis_events: crises,
        emotions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_yields_empty_metrics() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let range = DateRange::parse("2025-08-11", "2025-08-17").unwrap();
        let config = AnalyticsConfig::default();

        let summary = generate_summary(&db, "nobody", &range, &config).unwrap();
        assert_eq!(summary, PatientSummary::default());

        let report = generate_dashboard(&db, "nobody", &range, &config).unwrap();
        assert_eq!(report.mood_series.len(), 7);
        assert!(report.mood_series.iter().all(|p| p.value.is_none()));
        assert_eq!(report.conversation_counts.len(), 7);
        assert!(report.crisis_events.is_empty());
        assert!(report.emotions.is_empty());
    }
}
