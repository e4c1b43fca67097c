//! Database layer for amelia
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - A generic repository driven by per-table descriptors
//! - Entity-specific finders
//! - Patient/date-range queries feeding the analytics

pub mod range;
pub mod repo;
pub mod schema;
pub mod tables;

pub use range::{InsightRow, MoodRow, CrisisRow};
pub use repo::{Database, Entity, Filter, ListOptions, Order, Repository, TableDescriptor};
