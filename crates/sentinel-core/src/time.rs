//! RFC3339-as-text time convention used throughout the store.
//!
//! Every timestamp column is a `TEXT` column holding either an RFC3339 string
//! or the empty string, which means "unset" (see spec §3/§9: nullable
//! columns are avoided so JSON projection stays trivial). Some columns are
//! populated by SQL default expressions in the native
//! `"YYYY-MM-DD HH:MM:SS"` form rather than through application code, so
//! parsing must tolerate both.

use chrono::{DateTime, NaiveDateTime, Utc};

const NATIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The current instant, rendered as RFC3339 in UTC.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// `true` for the empty string, the sentinel value for "unset".
pub fn is_unset(s: &str) -> bool {
    s.is_empty()
}

/// Parses a stored timestamp, accepting RFC3339 or the engine's native
/// `YYYY-MM-DD HH:MM:SS` form. Returns `None` for the empty string or any
/// unparseable value.
pub fn parse_flexible(s: &str) -> Option<DateTime<Utc>> {
    if is_unset(s) {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, NATIVE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Renders `dt` as RFC3339, or `None` becomes the empty "unset" string.
pub fn render(dt: Option<DateTime<Utc>>) -> String {
    dt.map(|dt| dt.to_rfc3339()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_is_empty_string() {
        assert!(is_unset(""));
        assert!(!is_unset("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn parses_rfc3339() {
        let parsed = parse_flexible("2026-01-02T03:04:05Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn parses_native_sqlite_form() {
        let parsed = parse_flexible("2026-01-02 03:04:05").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-01-02 03:04:05");
    }

    #[test]
    fn empty_and_garbage_are_none() {
        assert!(parse_flexible("").is_none());
        assert!(parse_flexible("not-a-time").is_none());
    }

    #[test]
    fn render_roundtrips_none_to_empty() {
        assert_eq!(render(None), "");
    }
}
