//! Core domain types for amelia
//!
//! These types mirror the tables of the therapy assistant's store and the
//! typed payloads carried by conversation insights.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Profile** | A person using the product, either a patient or a therapist |
//! | **Conversation** | A bounded patient–assistant interaction |
//! | **Message** | A single utterance inside a conversation |
//! | **Insight** | A derived record (mood, crisis, emotions) attached to a conversation |
//! | **Insight type** | The catalogue entry naming an insight category by `type_key` |
//! | **Patient context** | Externally maintained triage snapshot for one patient |
//!
//! Insight content arrives as free-form JSON. It is decoded once, at the
//! data-access boundary, into [`InsightContent`] so callers never inspect
//! raw payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================
// Profiles
// ============================================

/// Role of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Patient,
    Therapist,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Patient => "patient",
            UserRole::Therapist => "therapist",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(UserRole::Patient),
            "therapist" => Ok(UserRole::Therapist),
            _ => Err(format!("unknown user role: {}", s)),
        }
    }
}

/// A patient or therapist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: UserRole,
    /// Profile picture reference
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Phone number reduced to its digits, if the profile has one.
    pub fn phone_digits(&self) -> Option<String> {
        self.phone.as_deref().map(digits_only).filter(|d| !d.is_empty())
    }
}

/// Strip everything but ASCII digits (`"+34 600-11"` → `"3460011"`).
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

// ============================================
// Conversations and messages
// ============================================

/// Conversation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Closed,
    Pending,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Closed => "closed",
            ConversationStatus::Pending => "pending",
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ConversationStatus::Active),
            "closed" => Ok(ConversationStatus::Closed),
            "pending" => Ok(ConversationStatus::Pending),
            _ => Err(format!("unknown conversation status: {}", s)),
        }
    }
}

/// A bounded interaction between a patient and the assistant.
///
/// Closed by an external process once the inactivity timeout elapses; after
/// that only `summary` is expected to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub patient_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    pub status: ConversationStatus,
    #[serde(default)]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Who sent a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    /// Sent by the patient
    Patient,
    /// Sent by the assistant
    Agent,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSender::Patient => "patient",
            MessageSender::Agent => "agent",
        }
    }
}

impl std::str::FromStr for MessageSender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(MessageSender::Patient),
            "agent" => Ok(MessageSender::Agent),
            _ => Err(format!("unknown message sender: {}", s)),
        }
    }
}

/// A single utterance. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    #[serde(default)]
    pub conversation_id: Option<i64>,
    pub patient_id: String,
    pub sender: MessageSender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Insights
// ============================================

/// Known insight categories, keyed by `insight_types.type_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    PrimaryEmotions,
    MoodClassification,
    CrisisClassification,
    ConversationalSummary,
}

impl InsightKind {
    pub fn type_key(&self) -> &'static str {
        match self {
            InsightKind::PrimaryEmotions => "primary_emotions",
            InsightKind::MoodClassification => "mood_classification",
            InsightKind::CrisisClassification => "crisis_classification",
            InsightKind::ConversationalSummary => "conversational_summary",
        }
    }

    pub fn from_type_key(key: &str) -> Option<Self> {
        match key {
            "primary_emotions" => Some(InsightKind::PrimaryEmotions),
            "mood_classification" => Some(InsightKind::MoodClassification),
            "crisis_classification" => Some(InsightKind::CrisisClassification),
            "conversational_summary" => Some(InsightKind::ConversationalSummary),
            _ => None,
        }
    }
}

/// Catalogue entry for an insight category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightType {
    pub id: i64,
    pub type_key: String,
    pub display_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

/// A derived analytical record attached to a conversation.
///
/// Created pending when a conversation starts and completed later by the
/// analysis pipeline, which fills in `content`.
#[derive(Debug, Clone, PartialEq)]
pub struct Insight {
    pub id: i64,
    pub conversation_id: i64,
    pub insight_type_id: i64,
    pub completed: bool,
    pub content: InsightContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Decoded insight payload, one variant per known content schema.
#[derive(Debug, Clone, PartialEq)]
pub enum InsightContent {
    Mood(MoodContent),
    Crisis(CrisisContent),
    PrimaryEmotions(PrimaryEmotionsContent),
    /// Payload of a category without a typed schema, or one that failed to decode
    Other(serde_json::Value),
    /// Pending insight, nothing written yet
    Empty,
}

impl InsightContent {
    /// Decode a raw payload according to the insight's type key.
    ///
    /// A payload that does not match its schema is kept as [`InsightContent::Other`]
    /// so it never counts towards a typed metric.
    pub fn decode(type_key: &str, raw: Option<serde_json::Value>) -> Self {
        let raw = match raw {
            None | Some(serde_json::Value::Null) => return InsightContent::Empty,
            Some(v) => v,
        };

        let decoded = match InsightKind::from_type_key(type_key) {
            Some(InsightKind::MoodClassification) => {
                serde_json::from_value(raw.clone()).map(InsightContent::Mood)
            }
            Some(InsightKind::CrisisClassification) => {
                serde_json::from_value(raw.clone()).map(InsightContent::Crisis)
            }
            Some(InsightKind::PrimaryEmotions) => {
                serde_json::from_value(raw.clone()).map(InsightContent::PrimaryEmotions)
            }
            Some(InsightKind::ConversationalSummary) | None => {
                return InsightContent::Other(raw);
            }
        };

        decoded.unwrap_or_else(|e| {
            tracing::debug!(type_key, error = %e, "Insight content did not match schema");
            InsightContent::Other(raw)
        })
    }

    /// Serialize back to JSON for storage. `Empty` maps to SQL NULL.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            InsightContent::Mood(c) => serde_json::to_value(c).ok(),
            InsightContent::Crisis(c) => serde_json::to_value(c).ok(),
            InsightContent::PrimaryEmotions(c) => serde_json::to_value(c).ok(),
            InsightContent::Other(v) => Some(v.clone()),
            InsightContent::Empty => None,
        }
    }
}

/// Payload of a `mood_classification` insight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoodContent {
    #[serde(default, deserialize_with = "lenient_string")]
    pub mood: Option<String>,
    /// Raw score; only numeric values in [0, 10] are meaningful.
    #[serde(default)]
    pub mood_score: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub factors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub classification_type: Option<String>,
}

impl MoodContent {
    /// The score, if it is a number within [0, 10].
    pub fn valid_score(&self) -> Option<f64> {
        self.mood_score
            .as_ref()
            .and_then(|v| v.as_f64())
            .filter(|s| s.is_finite() && (0.0..=10.0).contains(s))
    }
}

/// Payload of a `crisis_classification` insight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrisisContent {
    #[serde(default)]
    pub is_crisis: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default)]
    pub immediate_actions: Vec<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub crisis_severity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub activator: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub belief: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub consequence: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub context: Option<String>,
}

impl CrisisContent {
    pub fn is_crisis(&self) -> bool {
        self.is_crisis == Some(true)
    }
}

/// Payload of a `primary_emotions` insight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryEmotionsContent {
    #[serde(default)]
    pub primary_emotions: Vec<EmotionItem>,
}

/// One detected emotion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub emotion: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub trigger: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub context: Option<String>,
    /// 0–10 when present
    #[serde(default, deserialize_with = "lenient_f64")]
    pub intensity: Option<f64>,
}

/// Accept any JSON for an optional number, keeping only actual numbers.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}

/// Accept any JSON for an optional string; scalars are stringified, the rest dropped.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

// ============================================
// Patient context
// ============================================

/// Externally maintained side-record for a patient. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientContext {
    pub id: i64,
    pub patient_id: String,
    #[serde(default)]
    pub triage_info: Option<serde_json::Value>,
    #[serde(default)]
    pub active_tasks: Option<serde_json::Value>,
    #[serde(default)]
    pub therapist_notes_summary: Option<String>,
    pub last_updated_at: DateTime<Utc>,
}

impl PatientContext {
    /// Typed view over the fields of the triage snapshot the dashboard shows.
    pub fn triage(&self) -> Option<TriageInfo> {
        self.triage_info
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Subset of the triage snapshot. Keys follow the intake form's JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageInfo {
    #[serde(default, rename = "riesgo")]
    pub risk: Option<TriageRisk>,
    #[serde(default, rename = "motivo_consulta")]
    pub reason: Option<TriageReason>,
    #[serde(default, rename = "objetivos_4_semanas")]
    pub four_week_goals: Vec<String>,
    #[serde(default, rename = "fortalezas")]
    pub strengths: Vec<String>,
    #[serde(default, rename = "proxima_cita_iso8601")]
    pub next_appointment: Option<String>,
    #[serde(default, rename = "consentimiento_informado")]
    pub informed_consent: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageRisk {
    #[serde(default, rename = "nivel_riesgo_global")]
    pub overall_level: Option<String>,
    #[serde(default, rename = "acciones_inmediatas")]
    pub immediate_actions: Vec<String>,
    #[serde(default, rename = "ideacion_autolesiva")]
    pub self_harm_ideation: Option<String>,
    #[serde(default, rename = "riesgo_hacia_terceros")]
    pub risk_to_others: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageReason {
    #[serde(default, rename = "descripcion_breve")]
    pub summary: Option<String>,
    #[serde(default, rename = "objetivos_iniciales_usuario")]
    pub initial_goals: Vec<String>,
}

// ============================================
// Assignments and config
// ============================================

/// Links a therapist to a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapistPatientAssignment {
    pub id: i64,
    pub therapist_id: String,
    pub patient_id: String,
    #[serde(default = "default_assignment_status")]
    pub status: String,
    pub assigned_at: DateTime<Utc>,
}

fn default_assignment_status() -> String {
    "active".to_string()
}

/// Conversation inactivity timeout as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub id: i64,
    pub timeout_minutes: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
