// crates/sentinel-store/src/alerts.rs
//! Deduplicated, state-machine-tracked alerts (spec §3 "Alert", §4.5).

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

fn is_known_status(status: &str) -> bool {
    matches!(status, "" | "open" | "acked" | "resolved")
}

#[derive(Debug, Clone, Default)]
pub struct AlertWrite {
    pub dedupe_key: String,
    pub source: String,
    pub resource: String,
    pub title: String,
    pub message: String,
    pub severity: String,
    pub metadata: String,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct AlertRow {
    pub id: i64,
    pub dedupe_key: String,
    pub source: String,
    pub resource: String,
    pub title: String,
    pub message: String,
    pub severity: String,
    pub status: String,
    pub occurrences: i64,
    pub metadata: String,
    pub first_seen_at: String,
    pub last_seen_at: String,
    pub acked_at: String,
    pub resolved_at: String,
}

const ALERT_COLUMNS: &str =
    "id, dedupe_key, source, resource, title, message, severity, status, occurrences, metadata, first_seen_at, last_seen_at, acked_at, resolved_at";

impl Database {
    /// Inserts or, on a matching `dedupe_key`, updates an alert: bumps
    /// `occurrences`, refreshes the mutable fields, and reopens a resolved
    /// alert (spec §4.5 "reopen on recurrence").
    pub async fn upsert_alert(&self, write: &AlertWrite) -> DbResult<AlertRow> {
        let dedupe_key = write.dedupe_key.trim();
        if dedupe_key.is_empty() {
            return Err(DbError::Validation("dedupe_key is required".into()));
        }
        let source = if write.source.trim().is_empty() { "ops".to_string() } else { write.source.trim().to_string() };
        let title = if write.title.trim().is_empty() { dedupe_key.to_string() } else { write.title.trim().to_string() };
        let message = if write.message.trim().is_empty() { title.clone() } else { write.message.trim().to_string() };
        let severity = normalize_severity(&write.severity);
        let metadata = if write.metadata.trim().is_empty() { "{}".to_string() } else { write.metadata.clone() };
        let now = now_rfc3339();

        sqlx::query(
            "INSERT INTO alerts (dedupe_key, source, resource, title, message, severity, status, occurrences, metadata, first_seen_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open', 1, ?7, ?8, ?8)
             ON CONFLICT(dedupe_key) DO UPDATE SET
                source = excluded.source,
                resource = excluded.resource,
                title = excluded.title,
                message = excluded.message,
                severity = excluded.severity,
                metadata = excluded.metadata,
                occurrences = alerts.occurrences + 1,
                last_seen_at = excluded.last_seen_at,
                status = CASE WHEN alerts.status = 'resolved' THEN 'open' ELSE alerts.status END",
        )
        .bind(dedupe_key)
        .bind(&source)
        .bind(&write.resource)
        .bind(&title)
        .bind(&message)
        .bind(&severity)
        .bind(&metadata)
        .bind(&now)
        .execute(self.pool())
        .await
        .ctx("alerts::upsert")?;

        sqlx::query_as(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE dedupe_key = ?1"))
            .bind(dedupe_key)
            .fetch_one(self.pool())
            .await
            .ctx("alerts::upsert::reload")
    }

    /// Lists alerts, optionally filtered by status, newest-seen first.
    pub async fn list_alerts(&self, limit: i64, status: &str) -> DbResult<Vec<AlertRow>> {
        let status = status.trim().to_ascii_lowercase();
        if !is_known_status(&status) {
            return Err(DbError::InvalidFilter(format!("unknown status {status:?}")));
        }
        let limit = clamp_limit(limit);
        sqlx::query_as(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             WHERE (?1 = '' OR status = ?1)
             ORDER BY last_seen_at DESC, id DESC LIMIT ?2"
        ))
        .bind(&status)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .ctx("alerts::list")
    }

    /// Acks an alert unless it is already resolved.
    pub async fn ack_alert(&self, id: i64, at: &str) -> DbResult<()> {
        if id <= 0 {
            return Err(DbError::NotFound);
        }
        let at = if at.is_empty() { now_rfc3339() } else { at.to_string() };
        let result = sqlx::query(
            "UPDATE alerts SET status = 'acked', acked_at = ?1, last_seen_at = ?1
             WHERE id = ?2 AND status <> 'resolved'",
        )
        .bind(&at)
        .bind(id)
        .execute(self.pool())
        .await
        .ctx("alerts::ack")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Resolves an alert by `dedupe_key` unless already resolved.
    pub async fn resolve_alert(&self, dedupe_key: &str, at: &str) -> DbResult<()> {
        if dedupe_key.is_empty() {
            return Err(DbError::NotFound);
        }
        let at = if at.is_empty() { now_rfc3339() } else { at.to_string() };
        let result = sqlx::query(
            "UPDATE alerts SET status = 'resolved', resolved_at = ?1, last_seen_at = ?1
             WHERE dedupe_key = ?2 AND status <> 'resolved'",
        )
        .bind(&at)
        .bind(dedupe_key)
        .execute(self.pool())
        .await
        .ctx("alerts::resolve")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Deletes a resolved alert by id.
    pub async fn delete_alert(&self, id: i64) -> DbResult<()> {
        if id <= 0 {
            return Err(DbError::NotFound);
        }
        let result = sqlx::query("DELETE FROM alerts WHERE id = ?1 AND status = 'resolved'")
            .bind(id)
            .execute(self.pool())
            .await
            .ctx("alerts::delete")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
