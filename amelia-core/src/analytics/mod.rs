//! Dashboard analytics for amelia
//!
//! Pure aggregations over rows returned by the range queries:
//! - Engagement rate over message days
//! - Average mood and the daily mood series
//! - Crisis events
//! - Emotion breakdown
//! - Conversations per day
//!
//! [`summary`] assembles them per patient and range, and [`loader`] runs them
//! as independent, cached background loads.
//!
//! None of these functions fail: malformed or missing input degrades to an
//! empty series or `None`.

pub mod activity;
pub mod crisis;
pub mod emotions;
pub mod engagement;
pub mod loader;
pub mod mood;
pub mod period;
pub mod summary;

use chrono::NaiveDate;
use serde::Serialize;

pub use activity::daily_conversation_counts;
pub use crisis::crisis_events;
pub use emotions::{aggregate_emotions, EmotionSummary};
pub use engagement::engagement_percentage;
pub use loader::{MetricCache, MetricKey, MetricKind, MetricLoader, MetricState, MetricValue};
pub use mood::{average_mood, daily_mood_series};
pub use period::{DateRange, MAX_RANGE_DAYS};
pub use summary::{generate_dashboard, generate_summary, DashboardReport, PatientSummary};

/// One entry of a per-day series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint<T> {
    pub day: NaiveDate,
    /// `MM/DD` axis label
    pub label: String,
    pub value: T,
}

impl<T> DailyPoint<T> {
    pub fn new(day: NaiveDate, value: T) -> Self {
        Self {
            day,
            label: crate::format::day_label(day),
            value,
        }
    }
}

/// Round to one decimal place.
pub(crate) fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
