//! Import of table exports into the local store
//!
//! The backend's tables can be exported as one JSON document:
//!
//! ```json
//! {
//!   "profiles": [...],
//!   "insight_types": [...],
//!   "conversations": [...],
//!   "messages": [...],
//!   "insights": [...],
//!   "patient_context": [...],
//!   "assignments": [...],
//!   "conversation_config": [...]
//! }
//! ```
//!
//! Every array is optional. Rows are upserted by id in dependency order, so
//! re-importing the same export is a no-op. A row that fails to import is
//! reported in [`ImportResult::errors`] and does not stop the others.

use crate::db::repo::value_to_string;
use crate::db::{Database, Entity};
use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// A full export, as read from disk.
#[derive(Debug, Default, Deserialize)]
pub struct ImportBundle {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub insight_types: Vec<InsightType>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub insights: Vec<InsightRecord>,
    #[serde(default)]
    pub patient_context: Vec<PatientContext>,
    #[serde(default)]
    pub assignments: Vec<TherapistPatientAssignment>,
    #[serde(default)]
    pub conversation_config: Vec<ConversationConfig>,
}

/// An insight row as exported, with its content still raw JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct InsightRecord {
    pub id: i64,
    pub conversation_id: i64,
    pub insight_type_id: i64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Result of an import.
#[derive(Debug, Default)]
pub struct ImportResult {
    /// Rows written, by table name
    pub imported: HashMap<&'static str, usize>,
    /// Rows that could not be written (`table id: error`)
    pub errors: Vec<String>,
}

impl ImportResult {
    pub fn count(&self, table: &str) -> usize {
        self.imported.get(table).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.imported.values().sum()
    }
}

impl ImportBundle {
    /// Read an export from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::from)
    }
}

/// Upsert every row of `bundle` into `db`.
pub fn import_bundle(db: &Database, bundle: &ImportBundle) -> Result<ImportResult> {
    let mut result = ImportResult::default();

    upsert_all(db, &bundle.profiles, &mut result);
    upsert_all(db, &bundle.insight_types, &mut result);
    upsert_all(db, &bundle.conversations, &mut result);
    upsert_all(db, &bundle.messages, &mut result);

    // Content is decoded by type key, so resolve each record's type first.
    let type_keys: HashMap<i64, String> = db
        .repo::<InsightType>()
        .list(&Default::default())?
        .into_iter()
        .map(|t| (t.id, t.type_key))
        .collect();
    let mut insights = Vec::with_capacity(bundle.insights.len());
    for record in &bundle.insights {
        match type_keys.get(&record.insight_type_id) {
            Some(type_key) => insights.push(Insight {
                id: record.id,
                conversation_id: record.conversation_id,
                insight_type_id: record.insight_type_id,
                completed: record.completed,
                content: InsightContent::decode(type_key, record.content.clone()),
                created_at: record.created_at,
                updated_at: record.updated_at,
            }),
            None => result.errors.push(format!(
                "{} {}: unknown insight type {}",
                Insight::TABLE.name,
                record.id,
                record.insight_type_id
            )),
        }
    }
    upsert_all(db, &insights, &mut result);

    upsert_all(db, &bundle.patient_context, &mut result);
    upsert_all(db, &bundle.assignments, &mut result);
    upsert_all(db, &bundle.conversation_config, &mut result);

    tracing::info!(
        imported = result.total(),
        errors = result.errors.len(),
        "Import complete"
    );
    Ok(result)
}

/// Read `path` and import it.
pub fn import_file(db: &Database, path: &Path) -> Result<ImportResult> {
    tracing::info!(path = %path.display(), "Importing export file");
    let bundle = ImportBundle::from_file(path)?;
    import_bundle(db, &bundle)
}

fn upsert_all<E: Entity>(db: &Database, rows: &[E], result: &mut ImportResult) {
    if rows.is_empty() {
        return;
    }
    let repo = db.repo::<E>();
    let mut written = 0;
    for row in rows {
        match repo.upsert(row) {
            Ok(_) => written += 1,
            Err(e) => {
                let id = value_to_string(&row.id_value());
                tracing::warn!(
                    table = repo.table_name(),
                    id = %id,
                    error = %e,
                    "Row import failed"
                );
                result.errors.push(format!("{} {}: {}", repo.table_name(), id, e));
            }
        }
    }
    *result.imported.entry(repo.table_name()).or_default() += written;
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "profiles": [
            {"id": "p1", "full_name": "Ana", "email": "ana@example.com",
             "phone": "600111222", "role": "patient",
             "created_at": "2025-08-01T00:00:00Z"}
        ],
        "insight_types": [
            {"id": 1, "type_key": "mood_classification", "display_name": "Mood",
             "created_at": "2025-08-01T00:00:00Z"}
        ],
        "conversations": [
            {"id": 10, "patient_id": "p1", "started_at": "2025-08-15T09:00:00Z",
             "last_message_at": "2025-08-15T09:20:00Z", "status": "closed",
             "created_at": "2025-08-15T09:00:00Z"}
        ],
        "insights": [
            {"id": 100, "conversation_id": 10, "insight_type_id": 1, "completed": true,
             "content": {"mood": "calm", "mood_score": 6},
             "created_at": "2025-08-15T09:21:00Z"},
            {"id": 101, "conversation_id": 10, "insight_type_id": 9, "completed": true,
             "created_at": "2025-08-15T09:21:00Z"}
        ]
    }"#;

    #[test]
    fn test_import_bundle_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let bundle = ImportBundle::from_json(EXPORT).unwrap();

        let first = import_bundle(&db, &bundle).unwrap();
        assert_eq!(first.count("profiles"), 1);
        assert_eq!(first.count("conversations"), 1);
        assert_eq!(first.count("conversation_insights"), 1);
        assert_eq!(first.errors.len(), 1);
        assert!(first.errors[0].contains("unknown insight type 9"));

        let second = import_bundle(&db, &bundle).unwrap();
        assert_eq!(second.total(), first.total());
        assert_eq!(db.repo::<Conversation>().count(&[]).unwrap(), 1);

        let insight = db.repo::<Insight>().get(&100).unwrap().unwrap();
        assert!(matches!(insight.content, InsightContent::Mood(_)));
    }

    #[test]
    fn test_row_errors_do_not_stop_import() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        // Conversation references a patient that does not exist
        let bundle = ImportBundle::from_json(
            r#"{"conversations": [
                {"id": 1, "patient_id": "ghost", "started_at": "2025-08-15T09:00:00Z",
                 "status": "active", "created_at": "2025-08-15T09:00:00Z"}
            ],
            "conversation_config": [
                {"id": 1, "timeout_minutes": 20, "created_at": "2025-08-01T00:00:00Z"}
            ]}"#,
        )
        .unwrap();

        let result = import_bundle(&db, &bundle).unwrap();
        assert_eq!(result.count("conversations"), 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.count("conversation_config"), 1);
        assert_eq!(db.conversation_timeout_minutes(30).unwrap(), 20);
    }

    #[test]
    fn test_malformed_export_is_json_error() {
        assert!(matches!(
            ImportBundle::from_json("{\"profiles\": 3}"),
            Err(Error::Json(_))
        ));
    }
}
