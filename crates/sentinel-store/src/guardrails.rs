// crates/sentinel-store/src/guardrails.rs
//! Prioritised guardrail rules and append-only decision audit (spec §3, §4.8).

use regex_lite::Regex;
use serde::Serialize;
use sqlx::FromRow;

use sentinel_core::time::now_rfc3339;

use crate::error::{DbError, DbResult, ResultExt};
use crate::Database;

const GUARDRAIL_SCOPE: &str = "action";

fn normalize_mode(mode: &str) -> String {
    if mode.trim().is_empty() {
        "warn".to_string()
    } else {
        mode.trim().to_string()
    }
}

fn normalize_severity(severity: &str) -> String {
    match severity.trim().to_ascii_lowercase().as_str() {
        s @ ("info" | "warn" | "error") => s.to_string(),
        _ => "warn".to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct GuardrailRuleWrite {
    pub id: String,
    pub name: String,
    pub pattern: String,
    pub mode: String,
    pub severity: String,
    pub message: String,
    pub enabled: bool,
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct GuardrailRuleRow {
    pub id: String,
    pub name: String,
    pub scope: String,
    pub pattern: String,
    pub mode: String,
    pub severity: String,
    pub message: String,
    pub enabled: bool,
    pub priority: i64,
}

#[derive(Debug, Clone, Default)]
pub struct GuardrailAuditWrite {
    pub rule_id: String,
    pub decision: String,
    pub action: String,
    pub command: String,
    pub session: String,
    pub window_index: i64,
    pub pane_id: String,
    pub override_flag: bool,
    pub reason: String,
    pub metadata: String,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct GuardrailAuditRow {
    pub id: i64,
    pub rule_id: String,
    pub decision: String,
    pub action: String,
    pub command: String,
    pub session: String,
    pub window_index: i64,
    pub pane_id: String,
    pub override_flag: bool,
    pub reason: String,
    pub metadata: String,
    pub created_at: String,
}

const RULE_COLUMNS: &str = "id, name, scope, pattern, mode, severity, message, enabled, priority";
const AUDIT_COLUMNS: &str =
    "id, rule_id, decision, action, command, session, window_index, pane_id, override_flag, reason, metadata, created_at";

impl Database {
    /// Upserts a guardrail rule. `scope` is always coerced to `"action"`
    /// regardless of what the caller supplies.
    pub async fn upsert_guardrail_rule(&self, write: &GuardrailRuleWrite) -> DbResult<GuardrailRuleRow> {
        if write.id.is_empty() || write.pattern.is_empty() {
            return Err(DbError::Validation("id and pattern are required".into()));
        }
        Regex::new(&write.pattern).map_err(|e| DbError::Validation(format!("invalid pattern: {e}")))?;
        let mode = normalize_mode(&write.mode);
        let severity = normalize_severity(&write.severity);

        sqlx::query(
            "INSERT INTO guardrail_rules (id, name, scope, pattern, mode, severity, message, enabled, priority)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, scope = excluded.scope, pattern = excluded.pattern,
                mode = excluded.mode, severity = excluded.severity, message = excluded.message,
                enabled = excluded.enabled, priority = excluded.priority",
        )
        .bind(&write.id)
        .bind(&write.name)
        .bind(GUARDRAIL_SCOPE)
        .bind(&write.pattern)
        .bind(&mode)
        .bind(&severity)
        .bind(&write.message)
        .bind(write.enabled)
        .bind(write.priority)
        .execute(self.pool())
        .await
        .ctx("guardrails::upsert_rule")?;

        self.get_guardrail_rule(&write.id).await?.ok_or(DbError::NotFound)
    }

    pub async fn get_guardrail_rule(&self, id: &str) -> DbResult<Option<GuardrailRuleRow>> {
        sqlx::query_as(&format!("SELECT {RULE_COLUMNS} FROM guardrail_rules WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .ctx("guardrails::get_rule")
    }

    /// All rules ordered `priority ASC, id ASC`.
    pub async fn list_guardrail_rules(&self) -> DbResult<Vec<GuardrailRuleRow>> {
        sqlx::query_as(&format!("SELECT {RULE_COLUMNS} FROM guardrail_rules ORDER BY priority ASC, id ASC"))
            .fetch_all(self.pool())
            .await
            .ctx("guardrails::list_rules")
    }

    pub async fn delete_guardrail_rule(&self, id: &str) -> DbResult<()> {
        if id.is_empty() {
            return Err(DbError::NotFound);
        }
        let result = sqlx::query("DELETE FROM guardrail_rules WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .ctx("guardrails::delete_rule")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Appends one guardrail decision to the audit log.
    pub async fn insert_guardrail_audit(&self, write: &GuardrailAuditWrite) -> DbResult<GuardrailAuditRow> {
        let metadata = if write.metadata.trim().is_empty() { "{}".to_string() } else { write.metadata.clone() };
        let now = now_rfc3339();

        let id: (i64,) = sqlx::query_as(
            "INSERT INTO guardrail_audit
                (rule_id, decision, action, command, session, window_index, pane_id, override_flag, reason, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             RETURNING id",
        )
        .bind(&write.rule_id)
        .bind(&write.decision)
        .bind(&write.action)
        .bind(&write.command)
        .bind(&write.session)
        .bind(write.window_index)
        .bind(&write.pane_id)
        .bind(write.override_flag)
        .bind(&write.reason)
        .bind(&metadata)
        .bind(&now)
        .fetch_one(self.pool())
        .await
        .ctx("guardrails::insert_audit")?;

        Ok(GuardrailAuditRow {
            id: id.0,
            rule_id: write.rule_id.clone(),
            decision: write.decision.clone(),
            action: write.action.clone(),
            command: write.command.clone(),
            session: write.session.clone(),
            window_index: write.window_index,
            pane_id: write.pane_id.clone(),
            override_flag: write.override_flag,
            reason: write.reason.clone(),
            metadata,
            created_at: now,
        })
    }

    /// Audit entries, newest first.
    pub async fn list_guardrail_audit(&self, limit: i64) -> DbResult<Vec<GuardrailAuditRow>> {
        let limit = if limit <= 0 { 100 } else { limit };
        sqlx::query_as(&format!("SELECT {AUDIT_COLUMNS} FROM guardrail_audit ORDER BY created_at DESC, id DESC LIMIT ?1"))
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .ctx("guardrails::list_audit")
    }
}
