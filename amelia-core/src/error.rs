//! Error types for amelia-core

use thiserror::Error;

/// Main error type for the amelia-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed repository query (unknown column, bad filter)
    #[error("query error: {0}")]
    Query(String),

    /// Row addressed by id does not exist
    #[error("{table} row not found: {id}")]
    NotFound { table: &'static str, id: String },

    /// Date range could not be parsed or is inverted
    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    /// Summary webhook error
    #[error("webhook error: {0}")]
    Webhook(String),
}

/// Result type alias for amelia-core
pub type Result<T> = std::result::Result<T, Error>;
