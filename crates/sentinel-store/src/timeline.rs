// crates/sentinel-store/src/timeline.rs
//! Operator-scoped activity timeline (spec §3 "Activity events", §4.4).
//! Distinct from the watchtower per-pane timeline events, which live on the
//! `Database` directly for simplicity (see `insert_timeline_event` below).

use serde::Serialize;
use sqlx::FromRow;

use sentinel_core::time::now_rfc3339;

use crate::error::{DbError, DbResult, ResultExt};
use crate::Database;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

fn clamp_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_LIMIT
    } else {
        limit.min(MAX_LIMIT)
    }
}

fn normalize_severity(severity: &str) -> String {
    match severity.trim().to_ascii_lowercase().as_str() {
        "" => "info".to_string(),
        "warning" => "warn".to_string(),
        "err" => "error".to_string(),
        other => other.to_string(),
    }
}

fn is_known_severity(severity: &str) -> bool {
    matches!(severity, "" | "all" | "info" | "warn" | "error")
}

#[derive(Debug, Clone, Default)]
pub struct TimelineEventWrite {
    pub session: String,
    pub window_index: i64,
    pub pane_id: String,
    pub event_type: String,
    pub severity: String,
    pub command: String,
    pub cwd: String,
    pub duration_ms: i64,
    pub summary: String,
    pub details: String,
    pub marker: String,
    pub metadata: String,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct TimelineEventRow {
    pub id: i64,
    pub session: String,
    pub window_index: i64,
    pub pane_id: String,
    pub event_type: String,
    pub severity: String,
    pub command: String,
    pub cwd: String,
    pub duration_ms: i64,
    pub summary: String,
    pub details: String,
    pub marker: String,
    pub metadata: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityEventWrite {
    pub source: String,
    pub event_type: String,
    pub severity: String,
    pub resource: String,
    pub message: String,
    pub details: String,
    pub metadata: String,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct ActivityEventRow {
    pub id: i64,
    pub source: String,
    pub event_type: String,
    pub severity: String,
    pub resource: String,
    pub message: String,
    pub details: String,
    pub metadata: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct ActivitySearchQuery {
    pub severity: String,
    pub source: String,
    pub query: String,
    pub limit: i64,
}

#[derive(Debug, Clone)]
pub struct ActivitySearchResult {
    pub events: Vec<ActivityEventRow>,
    pub has_more: bool,
}

impl Database {
    /// Records one watchtower per-pane timeline event.
    pub async fn insert_timeline_event(&self, write: &TimelineEventWrite) -> DbResult<TimelineEventRow> {
        let severity = normalize_severity(&write.severity);
        let metadata = if write.metadata.trim().is_empty() { "{}".to_string() } else { write.metadata.clone() };
        let created_at = now_rfc3339();

        let id: (i64,) = sqlx::query_as(
            "INSERT INTO timeline_events
                (session, window_index, pane_id, event_type, severity, command, cwd, duration_ms, summary, details, marker, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             RETURNING id",
        )
        .bind(&write.session)
        .bind(write.window_index)
        .bind(&write.pane_id)
        .bind(&write.event_type)
        .bind(&severity)
        .bind(&write.command)
        .bind(&write.cwd)
        .bind(write.duration_ms)
        .bind(&write.summary)
        .bind(&write.details)
        .bind(&write.marker)
        .bind(&metadata)
        .bind(&created_at)
        .fetch_one(self.pool())
        .await
        .ctx("timeline::insert_event")?;

        Ok(TimelineEventRow {
            id: id.0,
            session: write.session.clone(),
            window_index: write.window_index,
            pane_id: write.pane_id.clone(),
            event_type: write.event_type.clone(),
            severity,
            command: write.command.clone(),
            cwd: write.cwd.clone(),
            duration_ms: write.duration_ms,
            summary: write.summary.clone(),
            details: write.details.clone(),
            marker: write.marker.clone(),
            metadata,
            created_at,
        })
    }

    /// Keeps the `max_rows` newest timeline events. Zero or negative is a no-op.
    pub async fn prune_timeline_events(&self, max_rows: i64) -> DbResult<u64> {
        if max_rows <= 0 {
            return Ok(0);
        }
        let result = sqlx::query(
            "DELETE FROM timeline_events WHERE id NOT IN (
                SELECT id FROM timeline_events ORDER BY created_at DESC, id DESC LIMIT ?1
             )",
        )
        .bind(max_rows)
        .execute(self.pool())
        .await
        .ctx("timeline::prune_events")?;
        Ok(result.rows_affected())
    }

    /// Records one operator-scoped activity event, applying defaults.
    pub async fn insert_activity_event(&self, write: &ActivityEventWrite) -> DbResult<ActivityEventRow> {
        let source = if write.source.trim().is_empty() { "ops".to_string() } else { write.source.clone() };
        let event_type = if write.event_type.trim().is_empty() { "ops.event".to_string() } else { write.event_type.clone() };
        let severity = normalize_severity(&write.severity);
        let metadata = if write.metadata.trim().is_empty() { "{}".to_string() } else { write.metadata.clone() };
        let created_at = now_rfc3339();

        let id: (i64,) = sqlx::query_as(
            "INSERT INTO activity_events (source, event_type, severity, resource, message, details, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING id",
        )
        .bind(&source)
        .bind(&event_type)
        .bind(&severity)
        .bind(&write.resource)
        .bind(&write.message)
        .bind(&write.details)
        .bind(&metadata)
        .bind(&created_at)
        .fetch_one(self.pool())
        .await
        .ctx("timeline::insert_activity_event")?;

        Ok(ActivityEventRow {
            id: id.0,
            source,
            event_type,
            severity,
            resource: write.resource.clone(),
            message: write.message.clone(),
            details: write.details.clone(),
            metadata,
            created_at,
        })
    }

    /// Searches activity events with severity/source/substring filters ANDed.
    pub async fn search_activity_events(&self, query: &ActivitySearchQuery) -> DbResult<ActivitySearchResult> {
        let severity = query.severity.trim().to_ascii_lowercase();
        if !is_known_severity(&severity) {
            return Err(DbError::InvalidFilter(format!("unknown severity {severity:?}")));
        }
        let limit = clamp_limit(query.limit);
        let fetch_limit = limit + 1;
        let needle = format!("%{}%", query.query.trim().to_ascii_lowercase());
        let has_needle = !query.query.trim().is_empty();
        let has_source = !query.source.trim().is_empty();

        let sql = "SELECT id, source, event_type, severity, resource, message, details, metadata, created_at
             FROM activity_events
             WHERE (?1 = '' OR ?1 = 'all' OR severity = ?1)
               AND (?2 = 0 OR LOWER(source) = LOWER(?3))
               AND (?4 = 0 OR LOWER(message) LIKE ?5 OR LOWER(details) LIKE ?5 OR LOWER(resource) LIKE ?5 OR LOWER(event_type) LIKE ?5)
             ORDER BY created_at DESC, id DESC
             LIMIT ?6";

        let mut rows: Vec<ActivityEventRow> = sqlx::query_as(sql)
            .bind(&severity)
            .bind(has_source)
            .bind(&query.source)
            .bind(has_needle)
            .bind(&needle)
            .bind(fetch_limit)
            .fetch_all(self.pool())
            .await
            .ctx("timeline::search_activity_events")?;

        let has_more = rows.len() as i64 > limit;
        rows.truncate(limit as usize);
        Ok(ActivitySearchResult { events: rows, has_more })
    }

    /// Keeps the `max_rows` newest activity events. Zero or negative is a no-op.
    pub async fn prune_activity_events(&self, max_rows: i64) -> DbResult<u64> {
        if max_rows <= 0 {
            return Ok(0);
        }
        let result = sqlx::query(
            "DELETE FROM activity_events WHERE id NOT IN (
                SELECT id FROM activity_events ORDER BY created_at DESC, id DESC LIMIT ?1
             )",
        )
        .bind(max_rows)
        .execute(self.pool())
        .await
        .ctx("timeline::prune_activity_events")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_activity_event_applies_defaults() {
        let db = Database::open_in_memory().await.unwrap();
        let row = db.insert_activity_event(&ActivityEventWrite::default()).await.unwrap();
        assert_eq!(row.source, "ops");
        assert_eq!(row.event_type, "ops.event");
        assert_eq!(row.severity, "info");
        assert_eq!(row.metadata, "{}");
    }

    #[tokio::test]
    async fn insert_activity_event_normalizes_severity_aliases() {
        let db = Database::open_in_memory().await.unwrap();
        let warning = db
            .insert_activity_event(&ActivityEventWrite { severity: "warning".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(warning.severity, "warn");
        let err = db
            .insert_activity_event(&ActivityEventWrite { severity: "err".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(err.severity, "error");
    }

    #[tokio::test]
    async fn search_rejects_unknown_severity() {
        let db = Database::open_in_memory().await.unwrap();
        let err = db
            .search_activity_events(&ActivitySearchQuery { severity: "critical".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidFilter(_)));
    }

    #[tokio::test]
    async fn search_filters_by_source_and_substring() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_activity_event(&ActivityEventWrite { source: "collector".into(), message: "disk low".into(), ..Default::default() })
            .await
            .unwrap();
        db.insert_activity_event(&ActivityEventWrite { source: "scheduler".into(), message: "run finished".into(), ..Default::default() })
            .await
            .unwrap();

        let result = db
            .search_activity_events(&ActivitySearchQuery { source: "collector".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].source, "collector");

        let result = db
            .search_activity_events(&ActivitySearchQuery { query: "finished".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].source, "scheduler");
    }

    #[tokio::test]
    async fn search_reports_has_more_with_small_limit() {
        let db = Database::open_in_memory().await.unwrap();
        for i in 0..5 {
            db.insert_activity_event(&ActivityEventWrite { message: format!("event {i}"), ..Default::default() })
                .await
                .unwrap();
        }
        let result = db.search_activity_events(&ActivitySearchQuery { limit: 3, ..Default::default() }).await.unwrap();
        assert_eq!(result.events.len(), 3);
        assert!(result.has_more);
    }

    #[tokio::test]
    async fn prune_activity_events_keeps_newest() {
        let db = Database::open_in_memory().await.unwrap();
        for i in 0..5 {
            db.insert_activity_event(&ActivityEventWrite { message: format!("event {i}"), ..Default::default() })
                .await
                .unwrap();
        }
        let pruned = db.prune_activity_events(2).await.unwrap();
        assert_eq!(pruned, 3);
        let result = db.search_activity_events(&ActivitySearchQuery { limit: 10, ..Default::default() }).await.unwrap();
        assert_eq!(result.events.len(), 2);
    }
}
