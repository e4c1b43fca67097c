//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.
//! Timestamps are TEXT in the fixed-width form produced by
//! [`crate::format::format_timestamp`].

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: core tables
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        id               TEXT PRIMARY KEY,
        full_name        TEXT NOT NULL,
        email            TEXT NOT NULL,
        phone            TEXT,
        role             TEXT NOT NULL DEFAULT 'patient',
        created_at       TEXT NOT NULL,
        updated_at       TEXT
    );

    CREATE TABLE IF NOT EXISTS insight_types (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        type_key         TEXT NOT NULL UNIQUE,
        display_name     TEXT NOT NULL,
        is_active        INTEGER NOT NULL DEFAULT 1,
        config           JSON,
        created_at       TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS conversations (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id       TEXT NOT NULL REFERENCES profiles(id),
        started_at       TEXT NOT NULL,
        last_message_at  TEXT,
        status           TEXT NOT NULL DEFAULT 'active',
        summary          TEXT,
        created_at       TEXT NOT NULL,
        updated_at       TEXT
    );

    CREATE TABLE IF NOT EXISTS messages (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id  INTEGER REFERENCES conversations(id),
        patient_id       TEXT NOT NULL REFERENCES profiles(id),
        sender           TEXT NOT NULL,
        content          TEXT NOT NULL,
        created_at       TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS conversation_insights (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id  INTEGER NOT NULL REFERENCES conversations(id),
        insight_type_id  INTEGER NOT NULL REFERENCES insight_types(id),
        completed        INTEGER NOT NULL DEFAULT 0,
        content          JSON,
        created_at       TEXT NOT NULL,
        updated_at       TEXT
    );

    CREATE TABLE IF NOT EXISTS patient_context (
        id                       INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id               TEXT NOT NULL UNIQUE REFERENCES profiles(id),
        triage_info              JSON,
        active_tasks             JSON,
        therapist_notes_summary  TEXT,
        last_updated_at          TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS therapist_patient_assignments (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        therapist_id     TEXT NOT NULL REFERENCES profiles(id),
        patient_id       TEXT NOT NULL REFERENCES profiles(id),
        status           TEXT NOT NULL DEFAULT 'active',
        assigned_at      TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS conversation_config (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        timeout_minutes  INTEGER NOT NULL DEFAULT 30,
        created_at       TEXT NOT NULL,
        updated_at       TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_profiles_role ON profiles(role);
    CREATE INDEX IF NOT EXISTS idx_profiles_phone ON profiles(phone);
    CREATE INDEX IF NOT EXISTS idx_assignments_therapist ON therapist_patient_assignments(therapist_id);
    CREATE INDEX IF NOT EXISTS idx_assignments_patient ON therapist_patient_assignments(patient_id);
    "#,
    // Version 2: profile pictures, typed insight view, range-query indexes
    r#"
    ALTER TABLE profiles ADD COLUMN avatar_url TEXT;

    -- Insight content is decoded by type key, so reads go through this view.
    CREATE VIEW IF NOT EXISTS conversation_insights_typed AS
        SELECT ci.*, it.type_key AS type_key
        FROM conversation_insights ci
        JOIN insight_types it ON it.id = ci.insight_type_id;

    CREATE INDEX IF NOT EXISTS idx_conversations_patient_started
        ON conversations(patient_id, started_at);
    CREATE INDEX IF NOT EXISTS idx_messages_patient_created
        ON messages(patient_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);
    CREATE INDEX IF NOT EXISTS idx_insights_conversation
        ON conversation_insights(conversation_id);
    CREATE INDEX IF NOT EXISTS idx_insights_pending
        ON conversation_insights(completed) WHERE completed = 0;
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
