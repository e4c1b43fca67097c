//! Per-metric background loading with a read-through cache.
//!
//! Each dashboard metric for a (patient, range) selection is loaded
//! independently, so one slow or failing metric never holds back the others.
//!
//! ## Generations
//!
//! Every selection change advances the cache generation. A load carries the
//! generation it was started under, and its result is only recorded if the
//! cache is still on that generation. A slow load for a previous selection
//! therefore can never overwrite the state of the current one, whatever
//! order the loads finish in.
//!
//! ## States
//!
//! ```text
//! (absent) --request--> Loading --complete--> Ready
//!                          |
//!                          +------complete---> Failed --retry--> Loading
//! ```
//!
//! A key that is `Loading` or `Ready` is never requested again. A `Failed`
//! key stays failed until [`MetricCache::retry`] is called for it.

use super::{
    aggregate_emotions, average_mood, crisis_events, daily_conversation_counts,
    daily_mood_series, engagement_percentage, generate_summary, DailyPoint, DateRange,
    EmotionSummary, PatientSummary,
};
use crate::config::AnalyticsConfig;
use crate::db::{CrisisRow, Database};
use crate::error::Result;
use crate::types::MessageSender;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// The metrics the dashboard shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Engagement,
    AverageMood,
    MoodSeries,
    CrisisEvents,
    Emotions,
    ConversationCounts,
    Summary,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::Engagement,
        MetricKind::AverageMood,
        MetricKind::MoodSeries,
        MetricKind::CrisisEvents,
        MetricKind::Emotions,
        MetricKind::ConversationCounts,
        MetricKind::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Engagement => "engagement",
            MetricKind::AverageMood => "average_mood",
            MetricKind::MoodSeries => "mood_series",
            MetricKind::CrisisEvents => "crisis_events",
            MetricKind::Emotions => "emotions",
            MetricKind::ConversationCounts => "conversation_counts",
            MetricKind::Summary => "summary",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one metric load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub patient_id: String,
    pub range: DateRange,
    pub kind: MetricKind,
}

impl MetricKey {
    pub fn new(patient_id: impl Into<String>, range: DateRange, kind: MetricKind) -> Self {
        Self {
            patient_id: patient_id.into(),
            range,
            kind,
        }
    }
}

/// A computed metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Engagement(u32),
    AverageMood(Option<f64>),
    MoodSeries(Vec<DailyPoint<Option<f64>>>),
    CrisisEvents(Vec<CrisisRow>),
    Emotions(Vec<EmotionSummary>),
    ConversationCounts(Vec<DailyPoint<usize>>),
    Summary(PatientSummary),
}

/// Fetch the rows one metric needs and aggregate them.
pub fn compute_metric(
    db: &Database,
    key: &MetricKey,
    config: &AnalyticsConfig,
) -> Result<MetricValue> {
    let patient = key.patient_id.as_str();
    let range = &key.range;
    let allowed = &config.mood_classification_types;

    let value = match key.kind {
        MetricKind::Engagement => {
            let timestamps =
                db.message_timestamps_in_range(patient, range, Some(MessageSender::Patient))?;
            MetricValue::Engagement(engagement_percentage(&timestamps, range))
        }
        MetricKind::AverageMood => {
            MetricValue::AverageMood(average_mood(&db.mood_rows_in_range(patient, range)?, allowed))
        }
        MetricKind::MoodSeries => MetricValue::MoodSeries(daily_mood_series(
            &db.mood_rows_in_range(patient, range)?,
            range,
            allowed,
        )),
        MetricKind::CrisisEvents => {
            MetricValue::CrisisEvents(crisis_events(&db.crisis_rows_in_range(patient, range)?))
        }
        MetricKind::Emotions => {
            MetricValue::Emotions(aggregate_emotions(&db.emotion_contents_in_range(patient, range)?))
        }
        MetricKind::ConversationCounts => MetricValue::ConversationCounts(
            daily_conversation_counts(&db.conversations_in_range(patient, range)?, range),
        ),
        MetricKind::Summary => MetricValue::Summary(generate_summary(db, patient, range, config)?),
    };
    Ok(value)
}

/// Load state of one metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricState {
    Loading,
    Ready(MetricValue),
    /// Load failed; the message is the error's display form
    Failed(String),
}

impl MetricState {
    pub fn is_loading(&self) -> bool {
        matches!(self, MetricState::Loading)
    }

    pub fn value(&self) -> Option<&MetricValue> {
        match self {
            MetricState::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Permission to run one load, tied to the generation it was issued in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub key: MetricKey,
    pub generation: u64,
}

/// Metric states keyed by [`MetricKey`].
#[derive(Debug, Default)]
pub struct MetricCache {
    generation: u64,
    /// Patient and range of the current generation
    selection: Option<(String, DateRange)>,
    entries: HashMap<MetricKey, MetricState>,
}

impl MetricCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new selection.
    ///
    /// Entries still loading belong to the previous generation and will
    /// never be completed, so they are dropped and may be requested again.
    pub fn advance_generation(&mut self) -> u64 {
        self.generation += 1;
        self.entries.retain(|_, state| !state.is_loading());
        tracing::debug!(generation = self.generation, "Metric selection changed");
        self.generation
    }

    /// Make `(patient_id, range)` the current selection.
    ///
    /// The generation only advances when the selection differs from the
    /// current one, so repeating a selection keeps its in-flight loads.
    /// Returns whether the generation advanced.
    pub fn select(&mut self, patient_id: &str, range: DateRange) -> bool {
        let unchanged = self
            .selection
            .as_ref()
            .is_some_and(|(p, r)| p == patient_id && *r == range);
        if unchanged {
            return false;
        }
        self.selection = Some((patient_id.to_string(), range));
        self.advance_generation();
        true
    }

    pub fn state(&self, key: &MetricKey) -> Option<&MetricState> {
        self.entries.get(key)
    }

    /// Mark `key` as loading and hand out a ticket, unless it is already
    /// loading, loaded or failed.
    pub fn request(&mut self, key: MetricKey) -> Option<LoadTicket> {
        if self.entries.contains_key(&key) {
            return None;
        }
        self.entries.insert(key.clone(), MetricState::Loading);
        Some(LoadTicket {
            key,
            generation: self.generation,
        })
    }

    /// Re-run a failed key. Keys in any other state are left alone.
    pub fn retry(&mut self, key: &MetricKey) -> Option<LoadTicket> {
        match self.entries.get_mut(key) {
            Some(state @ MetricState::Failed(_)) => {
                *state = MetricState::Loading;
                Some(LoadTicket {
                    key: key.clone(),
                    generation: self.generation,
                })
            }
            _ => None,
        }
    }

    /// Record the outcome of a load.
    ///
    /// Returns `false` if the ticket is from an older generation, in which
    /// case the result is discarded.
    pub fn complete(&mut self, ticket: &LoadTicket, result: Result<MetricValue>) -> bool {
        if ticket.generation != self.generation {
            tracing::debug!(
                kind = %ticket.key.kind,
                ticket_generation = ticket.generation,
                current_generation = self.generation,
                "Discarding stale metric result"
            );
            return false;
        }
        if !matches!(self.entries.get(&ticket.key), Some(MetricState::Loading)) {
            return false;
        }

        let state = match result {
            Ok(value) => MetricState::Ready(value),
            Err(e) => {
                tracing::warn!(
                    patient_id = %ticket.key.patient_id,
                    kind = %ticket.key.kind,
                    error = %e,
                    "Metric load failed"
                );
                MetricState::Failed(e.to_string())
            }
        };
        self.entries.insert(ticket.key.clone(), state);
        true
    }
}

/// Runs metric loads on the blocking pool and records them in a shared
/// [`MetricCache`].
///
/// Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct MetricLoader {
    db: Arc<Database>,
    config: Arc<AnalyticsConfig>,
    cache: Arc<Mutex<MetricCache>>,
}

impl MetricLoader {
    pub fn new(db: Arc<Database>, config: AnalyticsConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
            cache: Arc::new(Mutex::new(MetricCache::new())),
        }
    }

    fn cache(&self) -> MutexGuard<'_, MetricCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch to a selection and start loading `kinds` for it.
    ///
    /// Metrics already loading or cached for this selection are not
    /// started again. Each
    /// returned handle resolves to whether its result was recorded.
    pub fn select(
        &self,
        patient_id: &str,
        range: DateRange,
        kinds: &[MetricKind],
    ) -> Vec<JoinHandle<bool>> {
        let tickets: Vec<LoadTicket> = {
            let mut cache = self.cache();
            cache.select(patient_id, range);
            kinds
                .iter()
                .filter_map(|kind| cache.request(MetricKey::new(patient_id, range, *kind)))
                .collect()
        };
        tracing::info!(patient_id, %range, loads = tickets.len(), "Loading metrics");
        tickets.into_iter().map(|t| self.spawn(t)).collect()
    }

    /// Re-run a failed metric of the current selection.
    pub fn retry(&self, key: &MetricKey) -> Option<JoinHandle<bool>> {
        let ticket = self.cache().retry(key)?;
        Some(self.spawn(ticket))
    }

    pub fn state(&self, key: &MetricKey) -> Option<MetricState> {
        self.cache().state(key).cloned()
    }

    pub fn generation(&self) -> u64 {
        self.cache().generation()
    }

    fn spawn(&self, ticket: LoadTicket) -> JoinHandle<bool> {
        let db = Arc::clone(&self.db);
        let config = Arc::clone(&self.config);
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || {
            let result = compute_metric(&db, &ticket.key, &config);
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .complete(&ticket, result)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn range() -> DateRange {
        DateRange::parse("2025-08-15", "2025-08-17").unwrap()
    }

    fn key(patient: &str, kind: MetricKind) -> MetricKey {
        MetricKey::new(patient, range(), kind)
    }

    #[test]
    fn test_request_is_read_through() {
        let mut cache = MetricCache::new();
        let ticket = cache.request(key("p1", MetricKind::Engagement)).unwrap();
        assert!(cache.request(key("p1", MetricKind::Engagement)).is_none());

        assert!(cache.complete(&ticket, Ok(MetricValue::Engagement(43))));
        assert!(cache.request(key("p1", MetricKind::Engagement)).is_none());
        assert_eq!(
            cache.state(&ticket.key).and_then(|s| s.value()),
            Some(&MetricValue::Engagement(43))
        );
    }

    #[test]
    fn test_failed_key_needs_explicit_retry() {
        let mut cache = MetricCache::new();
        let ticket = cache.request(key("p1", MetricKind::Emotions)).unwrap();
        cache.complete(&ticket, Err(Error::Query("boom".to_string())));
        assert!(matches!(
            cache.state(&ticket.key),
            Some(MetricState::Failed(msg)) if msg.contains("boom")
        ));

        assert!(cache.request(ticket.key.clone()).is_none());
        let retry = cache.retry(&ticket.key).unwrap();
        assert!(cache.state(&ticket.key).unwrap().is_loading());
        assert!(cache.retry(&ticket.key).is_none());
        assert!(cache.complete(&retry, Ok(MetricValue::Emotions(vec![]))));
    }

    #[test]
    fn test_stale_completion_discarded() {
        let mut cache = MetricCache::new();
        let old = cache.request(key("p1", MetricKind::AverageMood)).unwrap();

        cache.advance_generation();
        let new = cache.request(key("p2", MetricKind::AverageMood)).unwrap();

        // p2 finishes first, then the slow p1 load
        assert!(cache.complete(&new, Ok(MetricValue::AverageMood(Some(4.0)))));
        assert!(!cache.complete(&old, Ok(MetricValue::AverageMood(Some(9.0)))));

        assert!(cache.state(&old.key).is_none());
        assert_eq!(
            cache.state(&new.key).and_then(|s| s.value()),
            Some(&MetricValue::AverageMood(Some(4.0)))
        );

        // Returning to p1 starts a fresh load
        cache.advance_generation();
        let again = cache.request(old.key.clone()).unwrap();
        assert_eq!(again.generation, cache.generation());
    }

    #[test]
    fn test_repeated_selection_keeps_generation() {
        let mut cache = MetricCache::new();
        assert!(cache.select("p1", range()));
        let generation = cache.generation();
        let ticket = cache.request(key("p1", MetricKind::Engagement)).unwrap();

        assert!(!cache.select("p1", range()));
        assert_eq!(cache.generation(), generation);
        assert!(cache.state(&ticket.key).unwrap().is_loading());
        assert!(cache.request(key("p1", MetricKind::Engagement)).is_none());
        assert!(cache.complete(&ticket, Ok(MetricValue::Engagement(67))));

        assert!(cache.select("p2", range()));
        assert!(cache.generation() > generation);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reselect_while_loading_is_skipped() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let db = Arc::new(db);
        let loader = MetricLoader::new(Arc::clone(&db), AnalyticsConfig::default());

        // Hold the connection so the first load cannot finish yet
        let conn = db.connection();
        let first = loader.select("p1", range(), &[MetricKind::Engagement]);
        let second = loader.select("p1", range(), &[MetricKind::Engagement]);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert!(loader
            .state(&key("p1", MetricKind::Engagement))
            .unwrap()
            .is_loading());
        drop(conn);

        for handle in first {
            assert!(handle.await.unwrap());
        }
        assert_eq!(
            loader.state(&key("p1", MetricKind::Engagement)),
            Some(MetricState::Ready(MetricValue::Engagement(0)))
        );
    }

    #[tokio::test]
    async fn test_loader_completes_every_metric() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let loader = MetricLoader::new(Arc::new(db), AnalyticsConfig::default());

        let handles = loader.select("p1", range(), &MetricKind::ALL);
        assert_eq!(handles.len(), MetricKind::ALL.len());
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        assert_eq!(
            loader.state(&key("p1", MetricKind::Engagement)),
            Some(MetricState::Ready(MetricValue::Engagement(0)))
        );
        match loader.state(&key("p1", MetricKind::MoodSeries)) {
            Some(MetricState::Ready(MetricValue::MoodSeries(series))) => {
                assert_eq!(series.len(), 3)
            }
            other => panic!("unexpected state {:?}", other),
        }

        // Same selection again: everything is cached
        assert!(loader.select("p1", range(), &MetricKind::ALL).is_empty());
    }

    #[tokio::test]
    async fn test_loader_failure_isolated_and_retryable() {
        // No migrations: every query fails
        let db = Arc::new(Database::open_in_memory().unwrap());
        let loader = MetricLoader::new(Arc::clone(&db), AnalyticsConfig::default());

        let handles = loader.select("p1", range(), &[MetricKind::Engagement, MetricKind::Emotions]);
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        let engagement = key("p1", MetricKind::Engagement);
        assert!(matches!(
            loader.state(&engagement),
            Some(MetricState::Failed(_))
        ));
        assert!(matches!(
            loader.state(&key("p1", MetricKind::Emotions)),
            Some(MetricState::Failed(_))
        ));

        db.migrate().unwrap();
        let handle = loader.retry(&engagement).unwrap();
        assert!(handle.await.unwrap());
        assert_eq!(
            loader.state(&engagement),
            Some(MetricState::Ready(MetricValue::Engagement(0)))
        );
        assert!(matches!(
            loader.state(&key("p1", MetricKind::Emotions)),
            Some(MetricState::Failed(_))
        ));
    }
}
