//! Key-insights summary webhook
//!
//! An external service summarises a patient's conversations for a date
//! range into a short list of key insights. This module fetches that list
//! and renders it for display.
//!
//! ## Usage
//!
//! Enable the webhook in `~/.config/amelia/config.toml`:
//!
//! ```toml
//! [webhook]
//! enabled = true
//! url = "https://hooks.example.com/webhook/summary"
//! timeout_secs = 30
//! ```
//!
//! Each request is made exactly once. A failure is returned to the caller,
//! which decides whether to offer a retry.

mod client;
mod markup;

pub use client::{KeyInsightsResponse, SyncWebhookClient, WebhookClient};
pub use markup::{render_key_insight, render_key_insights};
