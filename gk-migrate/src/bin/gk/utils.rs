use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static NON_IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("identifier pattern is valid"));

/// Format a DateTime to a human-readable string
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Turn a free-form description into a lowercase identifier fragment.
///
/// Returns `None` when nothing usable remains.
pub fn sanitize_description(description: &str) -> Option<String> {
    let lowered = description.trim().to_lowercase();
    let sanitized = NON_IDENTIFIER.replace_all(&lowered, "_");
    let sanitized = sanitized.trim_matches('_');
    (!sanitized.is_empty()).then(|| sanitized.to_string())
}
