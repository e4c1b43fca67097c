//! # amelia-core
//!
//! Core library for amelia - the therapist dashboard of an AI therapy
//! assistant.
//!
//! This library provides:
//! - Domain types for profiles, conversations, messages and insights
//! - Database storage layer with SQLite
//! - Import of JSON table exports
//! - Patient/date-range queries and the dashboard metric aggregations
//! - Background metric loading with a per-metric cache
//! - The key-insights summary webhook client
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Data flow
//!
//! A caller selects a patient and a date range; the range queries in
//! [`db::range`] fetch the matching rows; the functions in [`analytics`]
//! turn them into per-day series and per-category summaries.
//!
//! ## Example
//!
//! ```rust,no_run
//! use amelia_core::analytics::{generate_dashboard, DateRange};
//! use amelia_core::{Config, Database};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&config.database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let range = DateRange::parse("2025-08-11", "2025-08-17").expect("invalid range");
//! let report = generate_dashboard(&db, "patient-id", &range, &config.analytics)
//!     .expect("failed to compute dashboard");
//! println!("{} sessions", report.summary.total_sessions);
//! ```

// Re-export commonly used items at the crate root
pub use analytics::DateRange;
pub use config::Config;
pub use db::{Database, ListOptions, Repository};
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod ingest;
pub mod logging;
pub mod types;
pub mod webhook;
