//! Minimal markup for key insights: `**bold**` becomes `<strong>bold</strong>`.

use regex::Regex;
use std::sync::OnceLock;

fn bold_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").ok())
        .as_ref()
}

/// Render one insight. Text outside `**...**` pairs is left as is.
pub fn render_key_insight(text: &str) -> String {
    match bold_pattern() {
        Some(pattern) => pattern
            .replace_all(text, "<strong>$1</strong>")
            .into_owned(),
        None => text.to_string(),
    }
}

/// Render a list of insights, dropping blank entries.
pub fn render_key_insights(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(render_key_insight)
        .collect()
}
