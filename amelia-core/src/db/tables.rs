//! Table descriptors and entity-specific finders.
//!
//! Generic CRUD lives in [`super::repo::Repository`]; this module only adds
//! the lookups the dashboard and the analysis pipeline need on top of it.

use super::repo::{
    get_json, get_opt_ts, get_parsed, get_ts, json_value, opt_text_value, opt_ts_value, ts_value,
    Database, Entity, ListOptions, TableDescriptor,
};
use crate::error::{Error, Result};
use crate::types::*;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension, Row};

// ============================================
// Entity descriptors
// ============================================

impl Entity for Profile {
    type Id = str;

    const TABLE: TableDescriptor = TableDescriptor {
        name: "profiles",
        source: "profiles",
        id_column: "id",
        columns: &[
            "full_name",
            "email",
            "phone",
            "role",
            "avatar_url",
            "created_at",
            "updated_at",
        ],
        generated_id: false,
    };

    fn id_value(&self) -> Value {
        Value::Text(self.id.clone())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Profile {
            id: row.get("id")?,
            full_name: row.get("full_name")?,
            email: row.get("email")?,
            phone: row.get("phone")?,
            role: get_parsed(row, "role")?,
            avatar_url: row.get("avatar_url")?,
            created_at: get_ts(row, "created_at")?,
            updated_at: get_opt_ts(row, "updated_at")?,
        })
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.full_name.clone()),
            Value::Text(self.email.clone()),
            opt_text_value(self.phone.as_deref()),
            Value::Text(self.role.as_str().to_string()),
            opt_text_value(self.avatar_url.as_deref()),
            ts_value(self.created_at),
            opt_ts_value(self.updated_at),
        ]
    }
}

impl Entity for Conversation {
    type Id = i64;

    const TABLE: TableDescriptor = TableDescriptor {
        name: "conversations",
        source: "conversations",
        id_column: "id",
        columns: &[
            "patient_id",
            "started_at",
            "last_message_at",
            "status",
            "summary",
            "created_at",
            "updated_at",
        ],
        generated_id: true,
    };

    fn id_value(&self) -> Value {
        Value::Integer(self.id)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Conversation {
            id: row.get("id")?,
            patient_id: row.get("patient_id")?,
            started_at: get_ts(row, "started_at")?,
            last_message_at: get_opt_ts(row, "last_message_at")?,
            status: get_parsed(row, "status")?,
            summary: row.get("summary")?,
            created_at: get_ts(row, "created_at")?,
            updated_at: get_opt_ts(row, "updated_at")?,
        })
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.patient_id.clone()),
            ts_value(self.started_at),
            opt_ts_value(self.last_message_at),
            Value::Text(self.status.as_str().to_string()),
            opt_text_value(self.summary.as_deref()),
            ts_value(self.created_at),
            opt_ts_value(self.updated_at),
        ]
    }
}

impl Entity for Message {
    type Id = i64;

    const TABLE: TableDescriptor = TableDescriptor {
        name: "messages",
        source: "messages",
        id_column: "id",
        columns: &[
            "conversation_id",
            "patient_id",
            "sender",
            "content",
            "created_at",
        ],
        generated_id: true,
    };

    fn id_value(&self) -> Value {
        Value::Integer(self.id)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Message {
            id: row.get("id")?,
            conversation_id: row.get("conversation_id")?,
            patient_id: row.get("patient_id")?,
            sender: get_parsed(row, "sender")?,
            content: row.get("content")?,
            created_at: get_ts(row, "created_at")?,
        })
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            self.conversation_id
                .map(Value::Integer)
                .unwrap_or(Value::Null),
            Value::Text(self.patient_id.clone()),
            Value::Text(self.sender.as_str().to_string()),
            Value::Text(self.content.clone()),
            ts_value(self.created_at),
        ]
    }
}

impl Entity for InsightType {
    type Id = i64;

    const TABLE: TableDescriptor = TableDescriptor {
        name: "insight_types",
        source: "insight_types",
        id_column: "id",
        columns: &[
            "type_key",
            "display_name",
            "is_active",
            "config",
            "created_at",
        ],
        generated_id: true,
    };

    fn id_value(&self) -> Value {
        Value::Integer(self.id)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(InsightType {
            id: row.get("id")?,
            type_key: row.get("type_key")?,
            display_name: row.get("display_name")?,
            is_active: row.get("is_active")?,
            config: get_json(row, "config")?,
            created_at: get_ts(row, "created_at")?,
        })
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.type_key.clone()),
            Value::Text(self.display_name.clone()),
            Value::from(self.is_active),
            json_value(self.config.as_ref()),
            ts_value(self.created_at),
        ]
    }
}

impl Entity for Insight {
    type Id = i64;

    const TABLE: TableDescriptor = TableDescriptor {
        name: "conversation_insights",
        source: "conversation_insights_typed",
        id_column: "id",
        columns: &[
            "conversation_id",
            "insight_type_id",
            "completed",
            "content",
            "created_at",
            "updated_at",
        ],
        generated_id: true,
    };

    fn id_value(&self) -> Value {
        Value::Integer(self.id)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let type_key: String = row.get("type_key")?;
        Ok(Insight {
            id: row.get("id")?,
            conversation_id: row.get("conversation_id")?,
            insight_type_id: row.get("insight_type_id")?,
            completed: row.get("completed")?,
            content: InsightContent::decode(&type_key, get_json(row, "content")?),
            created_at: get_ts(row, "created_at")?,
            updated_at: get_opt_ts(row, "updated_at")?,
        })
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.conversation_id),
            Value::Integer(self.insight_type_id),
            Value::from(self.completed),
            json_value(self.content.to_json().as_ref()),
            ts_value(self.created_at),
            opt_ts_value(self.updated_at),
        ]
    }
}

impl Entity for PatientContext {
    type Id = i64;

    const TABLE: TableDescriptor = TableDescriptor {
        name: "patient_context",
        source: "patient_context",
        id_column: "id",
        columns: &[
            "patient_id",
            "triage_info",
            "active_tasks",
            "therapist_notes_summary",
            "last_updated_at",
        ],
        generated_id: true,
    };

    fn id_value(&self) -> Value {
        Value::Integer(self.id)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PatientContext {
            id: row.get("id")?,
            patient_id: row.get("patient_id")?,
            triage_info: get_json(row, "triage_info")?,
            active_tasks: get_json(row, "active_tasks")?,
            therapist_notes_summary: row.get("therapist_notes_summary")?,
            last_updated_at: get_ts(row, "last_updated_at")?,
        })
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.patient_id.clone()),
            json_value(self.triage_info.as_ref()),
            json_value(self.active_tasks.as_ref()),
            opt_text_value(self.therapist_notes_summary.as_deref()),
            ts_value(self.last_updated_at),
        ]
    }
}

impl Entity for TherapistPatientAssignment {
    type Id = i64;

    const TABLE: TableDescriptor = TableDescriptor {
        name: "therapist_patient_assignments",
        source: "therapist_patient_assignments",
        id_column: "id",
        columns: &["therapist_id", "patient_id", "status", "assigned_at"],
        generated_id: true,
    };

    fn id_value(&self) -> Value {
        Value::Integer(self.id)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(TherapistPatientAssignment {
            id: row.get("id")?,
            therapist_id: row.get("therapist_id")?,
            patient_id: row.get("patient_id")?,
            status: row.get("status")?,
            assigned_at: get_ts(row, "assigned_at")?,
        })
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.therapist_id.clone()),
            Value::Text(self.patient_id.clone()),
            Value::Text(self.status.clone()),
            ts_value(self.assigned_at),
        ]
    }
}

impl Entity for ConversationConfig {
    type Id = i64;

    const TABLE: TableDescriptor = TableDescriptor {
        name: "conversation_config",
        source: "conversation_config",
        id_column: "id",
        columns: &["timeout_minutes", "created_at", "updated_at"],
        generated_id: true,
    };

    fn id_value(&self) -> Value {
        Value::Integer(self.id)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ConversationConfig {
            id: row.get("id")?,
            timeout_minutes: row.get("timeout_minutes")?,
            created_at: get_ts(row, "created_at")?,
            updated_at: get_opt_ts(row, "updated_at")?,
        })
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.timeout_minutes),
            ts_value(self.created_at),
            opt_ts_value(self.updated_at),
        ]
    }
}

// ============================================
// Finders
// ============================================

impl Database {
    // ============================================
    // Profile operations
    // ============================================

    /// Profiles with the given role, sorted by name
    pub fn profiles_by_role(&self, role: UserRole) -> Result<Vec<Profile>> {
        self.repo::<Profile>().list(
            &ListOptions::new()
                .filter("role", role.as_str().to_string())
                .order_by("full_name", true),
        )
    }

    /// All patients, sorted by name
    pub fn patients(&self) -> Result<Vec<Profile>> {
        self.profiles_by_role(UserRole::Patient)
    }

    /// First therapist by name, if any
    pub fn first_therapist(&self) -> Result<Option<Profile>> {
        Ok(self
            .repo::<Profile>()
            .list(
                &ListOptions::new()
                    .filter("role", UserRole::Therapist.as_str().to_string())
                    .order_by("full_name", true)
                    .limit(1),
            )?
            .into_iter()
            .next())
    }

    /// Find a profile whose phone number has the same digits.
    ///
    /// Stored numbers may carry formatting, so the comparison is digit-only.
    pub fn find_profile_by_phone(&self, phone: &str) -> Result<Option<Profile>> {
        let digits = digits_only(phone);
        if digits.is_empty() {
            return Ok(None);
        }

        let exact = self
            .repo::<Profile>()
            .list(&ListOptions::new().filter("phone", digits.clone()).limit(1))?;
        if let Some(profile) = exact.into_iter().next() {
            return Ok(Some(profile));
        }

        let conn = self.connection();
        let mut stmt = conn.prepare("SELECT * FROM profiles WHERE phone IS NOT NULL")?;
        let found = stmt
            .query_map([], Profile::from_row)?
            .filter_map(|r| r.ok())
            .find(|p| p.phone_digits().as_deref() == Some(digits.as_str()));
        Ok(found)
    }

    /// Case-insensitive substring search on `full_name`
    pub fn search_profiles_by_name(&self, term: &str) -> Result<Vec<Profile>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT * FROM profiles WHERE full_name LIKE ?1 ESCAPE '\\' ORDER BY full_name ASC",
        )?;
        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let rows = stmt
            .query_map([format!("%{}%", escaped)], Profile::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ============================================
    // Patient context operations
    // ============================================

    /// The context record of a patient, if one has been written
    pub fn patient_context(&self, patient_id: &str) -> Result<Option<PatientContext>> {
        Ok(self
            .repo::<PatientContext>()
            .list(
                &ListOptions::new()
                    .filter("patient_id", patient_id.to_string())
                    .limit(1),
            )?
            .into_iter()
            .next())
    }

    /// Replace the triage snapshot, creating the context record if needed
    pub fn write_triage_info(
        &self,
        patient_id: &str,
        triage_info: serde_json::Value,
    ) -> Result<PatientContext> {
        let repo = self.repo::<PatientContext>();
        match self.patient_context(patient_id)? {
            Some(mut existing) => {
                existing.triage_info = Some(triage_info);
                existing.last_updated_at = Utc::now();
                repo.update(&existing)
            }
            None => repo.create(&PatientContext {
                id: 0,
                patient_id: patient_id.to_string(),
                triage_info: Some(triage_info),
                active_tasks: None,
                therapist_notes_summary: None,
                last_updated_at: Utc::now(),
            }),
        }
    }

    // ============================================
    // Assignment operations
    // ============================================

    /// Patients with an active assignment to the therapist, sorted by name
    pub fn patients_for_therapist(&self, therapist_id: &str) -> Result<Vec<Profile>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            r#"
            SELECT p.*
            FROM therapist_patient_assignments a
            JOIN profiles p ON p.id = a.patient_id
            WHERE a.therapist_id = ?1 AND a.status = 'active'
            ORDER BY p.full_name ASC
            "#,
        )?;
        let rows = stmt
            .query_map([therapist_id], Profile::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Active assignment for a patient, most recent first
    pub fn active_assignment_for_patient(
        &self,
        patient_id: &str,
    ) -> Result<Option<TherapistPatientAssignment>> {
        Ok(self
            .repo::<TherapistPatientAssignment>()
            .list(
                &ListOptions::new()
                    .filter("patient_id", patient_id.to_string())
                    .filter("status", "active".to_string())
                    .order_by("assigned_at", false)
                    .limit(1),
            )?
            .into_iter()
            .next())
    }

    // ============================================
    // Conversation operations
    // ============================================

    /// Most recently started conversation of a patient
    pub fn latest_conversation(&self, patient_id: &str) -> Result<Option<Conversation>> {
        Ok(self
            .repo::<Conversation>()
            .list(
                &ListOptions::new()
                    .filter("patient_id", patient_id.to_string())
                    .order_by("started_at", false)
                    .limit(1),
            )?
            .into_iter()
            .next())
    }

    /// Active conversations of a patient, newest first
    pub fn active_conversations(&self, patient_id: &str) -> Result<Vec<Conversation>> {
        self.repo::<Conversation>().list(
            &ListOptions::new()
                .filter("patient_id", patient_id.to_string())
                .filter("status", ConversationStatus::Active.as_str().to_string())
                .order_by("started_at", false),
        )
    }

    /// Close a conversation, optionally annotating it with a summary
    pub fn close_conversation(&self, id: i64, summary: Option<&str>) -> Result<Conversation> {
        let repo = self.repo::<Conversation>();
        let mut conversation = repo.get(&id)?.ok_or(Error::NotFound {
            table: "conversations",
            id: id.to_string(),
        })?;
        conversation.status = ConversationStatus::Closed;
        conversation.updated_at = Some(Utc::now());
        if let Some(summary) = summary {
            conversation.summary = Some(summary.to_string());
        }
        tracing::info!(conversation_id = id, "Closing conversation");
        repo.update(&conversation)
    }

    /// Messages of a conversation, oldest first
    pub fn conversation_messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        self.repo::<Message>().list(
            &ListOptions::new()
                .filter("conversation_id", conversation_id)
                .order_by("created_at", true),
        )
    }

    // ============================================
    // Insight type operations
    // ============================================

    /// Insight types that new conversations get a pending insight for
    pub fn active_insight_types(&self) -> Result<Vec<InsightType>> {
        self.repo::<InsightType>().list(
            &ListOptions::new()
                .filter("is_active", true)
                .order_by("display_name", true),
        )
    }

    pub fn insight_type_by_key(&self, type_key: &str) -> Result<Option<InsightType>> {
        Ok(self
            .repo::<InsightType>()
            .list(
                &ListOptions::new()
                    .filter("type_key", type_key.to_string())
                    .limit(1),
            )?
            .into_iter()
            .next())
    }

    /// Enable or disable an insight type. Returns false if the key is unknown.
    pub fn set_insight_type_active(&self, type_key: &str, active: bool) -> Result<bool> {
        let conn = self.connection();
        let changed = conn.execute(
            "UPDATE insight_types SET is_active = ?1 WHERE type_key = ?2",
            params![active, type_key],
        )?;
        Ok(changed > 0)
    }

    // ============================================
    // Insight operations
    // ============================================

    /// Create one pending insight per active insight type for a conversation.
    ///
    /// Returns the number of insights created.
    pub fn create_pending_insights(&self, conversation_id: i64) -> Result<usize> {
        let repo = self.repo::<Insight>();
        let now = Utc::now();
        let mut created = 0;
        for insight_type in self.active_insight_types()? {
            repo.create(&Insight {
                id: 0,
                conversation_id,
                insight_type_id: insight_type.id,
                completed: false,
                content: InsightContent::Empty,
                created_at: now,
                updated_at: None,
            })?;
            created += 1;
        }
        tracing::debug!(conversation_id, created, "Created pending insights");
        Ok(created)
    }

    /// Insights still waiting for the analysis pipeline, oldest first
    pub fn pending_insights(&self) -> Result<Vec<Insight>> {
        self.repo::<Insight>().list(
            &ListOptions::new()
                .filter("completed", false)
                .order_by("created_at", true),
        )
    }

    /// Insights of a conversation, newest first
    pub fn conversation_insights(
        &self,
        conversation_id: i64,
        completed_only: bool,
    ) -> Result<Vec<Insight>> {
        let mut options = ListOptions::new().filter("conversation_id", conversation_id);
        if completed_only {
            options = options.filter("completed", true);
        }
        self.repo::<Insight>()
            .list(&options.order_by("created_at", false))
    }

    /// Store the analysis result of an insight and mark it completed.
    pub fn complete_insight(&self, id: i64, content: serde_json::Value) -> Result<Insight> {
        let conn = self.connection();
        let changed = conn.execute(
            "UPDATE conversation_insights SET completed = 1, content = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                content.to_string(),
                crate::format::format_timestamp(Utc::now()),
                id
            ],
        )?;
        drop(conn);

        if changed == 0 {
            return Err(Error::NotFound {
                table: "conversation_insights",
                id: id.to_string(),
            });
        }
        self.repo::<Insight>().get(&id)?.ok_or(Error::NotFound {
            table: "conversation_insights",
            id: id.to_string(),
        })
    }

    // ============================================
    // Conversation config operations
    // ============================================

    /// Current inactivity timeout, or `default_minutes` if none is stored
    pub fn conversation_timeout_minutes(&self, default_minutes: i64) -> Result<i64> {
        let conn = self.connection();
        let stored: Option<i64> = conn
            .query_row(
                "SELECT timeout_minutes FROM conversation_config ORDER BY created_at DESC, id DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()?;
        Ok(stored.unwrap_or(default_minutes))
    }

    /// Write a new inactivity timeout
    pub fn set_conversation_timeout_minutes(&self, minutes: i64) -> Result<ConversationConfig> {
        let repo = self.repo::<ConversationConfig>();
        let current = repo
            .list(
                &ListOptions::new()
                    .order_by("created_at", false)
                    .limit(1),
            )?
            .into_iter()
            .next();
        match current {
            Some(mut config) => {
                config.timeout_minutes = minutes;
                config.updated_at = Some(Utc::now());
                repo.update(&config)
            }
            None => repo.create(&ConversationConfig {
                id: 0,
                timeout_minutes: minutes,
                created_at: Utc::now(),
                updated_at: None,
            }),
        }
    }
}
