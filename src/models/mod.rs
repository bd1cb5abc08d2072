pub mod activity;
pub mod analytics;
pub mod category;
pub mod comment;
pub mod contact;
pub mod homepage;
pub mod media;
pub mod newsletter;
pub mod post;
pub mod project;
pub mod service;
pub mod session;
pub mod user;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};

/// Storage format for every timestamp column. Matches SQLite's `CURRENT_TIMESTAMP`,
/// so string comparison orders timestamps on both backends.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Status values shared by posts and projects.
pub const CONTENT_STATUSES: &[&str] = &["draft", "published", "archived"];

pub fn now_timestamp() -> String {
    Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

/// Timestamp `offset` from now (negative for the past).
pub fn timestamp_from_now(offset: Duration) -> String {
    (Utc::now().naive_utc() + offset)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

pub fn days_ago(days: i64) -> String {
    timestamp_from_now(-Duration::days(days))
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, ISO-8601 with `T` (seconds optional, offset
/// or fraction allowed) and bare dates.
pub fn normalize_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in [
        TIMESTAMP_FORMAT,
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Filters shared by post and project listings.
#[derive(Debug, Clone, Default)]
pub struct ContentQuery {
    pub status: Option<String>,
    pub category_id: Option<i64>,
    pub author_id: Option<i64>,
    pub featured: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

/// Serialize a column holding JSON text as the JSON value itself.
pub fn json_text<S: Serializer>(raw: &str, serializer: S) -> Result<S::Ok, S::Error> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => value.serialize(serializer),
        Err(_) => serializer.serialize_str(raw),
    }
}

pub fn json_text_opt<S: Serializer>(raw: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    match raw {
        Some(raw) => json_text(raw, serializer),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_accept_common_shapes() {
        let expected = "2024-03-09 14:05:00";
        for raw in [
            "2024-03-09 14:05:00",
            "2024-03-09T14:05:00",
            "2024-03-09T14:05",
            "2024-03-09T14:05:00Z",
            "2024-03-09T14:05:00.000Z",
        ] {
            let parsed = normalize_timestamp(raw).unwrap();
            assert_eq!(parsed.format(TIMESTAMP_FORMAT).to_string(), expected, "{}", raw);
        }
        assert_eq!(
            normalize_timestamp("2024-03-09")
                .unwrap()
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            "2024-03-09 00:00:00"
        );
        assert!(normalize_timestamp("next tuesday").is_none());
    }

    #[test]
    fn past_timestamps_sort_before_now() {
        assert!(days_ago(1) < now_timestamp());
        assert!(timestamp_from_now(Duration::hours(1)) > now_timestamp());
    }
}
