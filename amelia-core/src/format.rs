//! Timestamp and display helpers shared across the store and the CLIs.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Format a timestamp the way the store keeps it: RFC 3339, UTC, milliseconds.
///
/// The fixed width makes lexical order equal chronological order, which the
/// range queries rely on.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored or imported timestamp.
///
/// Accepts RFC 3339 with any offset, and offset-less `YYYY-MM-DDTHH:MM:SS[.f]`
/// or `YYYY-MM-DD HH:MM:SS[.f]`, which are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// `MM/DD` label used on chart axes.
pub fn day_label(day: NaiveDate) -> String {
    day.format("%m/%d").to_string()
}

/// Format a mean for display: one decimal, or an em dash when absent.
///
/// Zero is a legitimate score, so absence never renders as `0`.
pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(s) => format!("{:.1}", s),
        None => "—".to_string(),
    }
}

/// Format a timestamp as relative time (e.g., "2h ago").
pub fn format_relative_time(ts: DateTime<Utc>) -> String {
    let now = Utc::now();
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}
