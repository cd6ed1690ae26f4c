// crates/sentinel-store/src/scheduler.rs
//! Cron/once bindings of runbooks (spec §3 "Schedule", §4.7).

use serde::Serialize;
use sqlx::FromRow;

use sentinel_core::ids::schedule_id;

use crate::error::{DbError, DbResult, ResultExt};
use crate::Database;

#[derive(Debug, Clone, Default)]
pub struct ScheduleWrite {
    pub id: String,
    pub runbook_id: String,
    pub name: String,
    pub schedule_type: String,
    pub cron_expr: String,
    pub timezone: String,
    pub run_at: String,
    pub enabled: bool,
    pub next_run_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct ScheduleRow {
    pub id: String,
    pub runbook_id: String,
    pub name: String,
    pub schedule_type: String,
    pub cron_expr: String,
    pub timezone: String,
    pub run_at: String,
    pub enabled: bool,
    pub last_run_at: String,
    pub last_run_status: String,
    pub next_run_at: String,
}

const SCHEDULE_COLUMNS: &str =
    "id, runbook_id, name, schedule_type, cron_expr, timezone, run_at, enabled, last_run_at, last_run_status, next_run_at";

impl Database {
    /// Inserts a schedule, assigning a 20-hex id when `id` is empty.
    pub async fn insert_schedule(&self, write: &ScheduleWrite) -> DbResult<ScheduleRow> {
        if write.runbook_id.is_empty() {
            return Err(DbError::Validation("runbook_id is required".into()));
        }
        let id = if write.id.is_empty() { schedule_id() } else { write.id.clone() };
        let schedule_type = if write.schedule_type.is_empty() { "once".to_string() } else { write.schedule_type.clone() };

        sqlx::query(
            "INSERT INTO schedules (id, runbook_id, name, schedule_type, cron_expr, timezone, run_at, enabled, next_run_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&id)
        .bind(&write.runbook_id)
        .bind(&write.name)
        .bind(&schedule_type)
        .bind(&write.cron_expr)
        .bind(&write.timezone)
        .bind(&write.run_at)
        .bind(write.enabled)
        .bind(&write.next_run_at)
        .execute(self.pool())
        .await
        .ctx("scheduler::insert")?;

        self.get_schedule(&id).await?.ok_or(DbError::NotFound)
    }

    pub async fn get_schedule(&self, id: &str) -> DbResult<Option<ScheduleRow>> {
        sqlx::query_as(&format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .ctx("scheduler::get")
    }

    pub async fn update_schedule(&self, write: &ScheduleWrite) -> DbResult<()> {
        if write.id.is_empty() {
            return Err(DbError::NotFound);
        }
        let result = sqlx::query(
            "UPDATE schedules SET runbook_id = ?1, name = ?2, schedule_type = ?3, cron_expr = ?4,
                    timezone = ?5, run_at = ?6, enabled = ?7, next_run_at = ?8
             WHERE id = ?9",
        )
        .bind(&write.runbook_id)
        .bind(&write.name)
        .bind(&write.schedule_type)
        .bind(&write.cron_expr)
        .bind(&write.timezone)
        .bind(&write.run_at)
        .bind(write.enabled)
        .bind(&write.next_run_at)
        .bind(&write.id)
        .execute(self.pool())
        .await
        .ctx("scheduler::update")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_schedule(&self, id: &str) -> DbResult<()> {
        if id.is_empty() {
            return Err(DbError::NotFound);
        }
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .ctx("scheduler::delete")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Enabled schedules due at or before `now`, ordered `next_run_at ASC`.
    /// `limit<=0` means unlimited.
    pub async fn list_due_schedules(&self, now: &str, limit: i64) -> DbResult<Vec<ScheduleRow>> {
        let limit = if limit <= 0 { -1 } else { limit };
        sqlx::query_as(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules
             WHERE enabled = 1 AND next_run_at <> '' AND next_run_at <= ?1
             ORDER BY next_run_at ASC LIMIT ?2"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .ctx("scheduler::list_due")
    }

    pub async fn update_schedule_after_run(
        &self,
        id: &str,
        last_run_at: &str,
        last_run_status: &str,
        next_run_at: &str,
        enabled: bool,
    ) -> DbResult<()> {
        if id.is_empty() {
            return Err(DbError::NotFound);
        }
        let result = sqlx::query(
            "UPDATE schedules SET last_run_at = ?1, last_run_status = ?2, next_run_at = ?3, enabled = ?4 WHERE id = ?5",
        )
        .bind(last_run_at)
        .bind(last_run_status)
        .bind(next_run_at)
        .bind(enabled)
        .bind(id)
        .execute(self.pool())
        .await
        .ctx("scheduler::update_after_run")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_schedules_by_runbook(&self, runbook_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM schedules WHERE runbook_id = ?1")
            .bind(runbook_id)
            .execute(self.pool())
            .await
            .ctx("scheduler::delete_by_runbook")?;
        Ok(result.rows_affected())
    }
}
