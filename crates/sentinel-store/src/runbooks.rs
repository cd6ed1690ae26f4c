// crates/sentinel-store/src/runbooks.rs
//! Named procedures and their execution records (spec §3 "Runbook" /
//! "Runbook run", §4.6).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use sentinel_core::ids::runbook_id;
use sentinel_core::time::now_rfc3339;

use crate::error::{DbError, DbResult, ResultExt};
use crate::Database;

const ORPHAN_ERROR: &str = "interrupted by server restart";

#[derive(Debug, Clone, Default)]
pub struct RunbookWrite {
    pub id: String,
    pub name: String,
    pub description: String,
    pub steps: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct RunbookRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub steps: String,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunWrite {
    pub id: String,
    pub status: String,
    pub completed_steps: i64,
    pub current_step: String,
    pub error: String,
    pub step_results: String,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct RunbookRunRow {
    pub id: String,
    pub runbook_id: String,
    pub runbook_name: String,
    pub status: String,
    pub total_steps: i64,
    pub completed_steps: i64,
    pub current_step: String,
    pub error: String,
    pub step_results: String,
    pub created_at: String,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: i64,
}

const RUN_COLUMNS: &str =
    "id, runbook_id, runbook_name, status, total_steps, completed_steps, current_step, error, step_results, created_at, started_at, finished_at";

fn step_titles(steps_json: &str) -> Vec<String> {
    let parsed: Value = serde_json::from_str(steps_json).unwrap_or(Value::Array(vec![]));
    parsed
        .as_array()
        .map(|steps| {
            steps
                .iter()
                .map(|s| s.get("title").and_then(Value::as_str).unwrap_or("").to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_step_results(step_results_json: &str) -> Vec<StepResult> {
    serde_json::from_str(step_results_json).unwrap_or_default()
}

impl Database {
    /// Inserts a new runbook. Assigns a 32-hex id when `id` is empty.
    pub async fn insert_runbook(&self, write: &RunbookWrite) -> DbResult<RunbookRow> {
        if write.name.trim().is_empty() {
            return Err(DbError::Validation("name is required".into()));
        }
        let id = if write.id.trim().is_empty() { runbook_id() } else { write.id.clone() };
        if self.get_runbook(&id).await?.is_some() {
            return Err(DbError::Validation(format!("runbook id {id} already exists")));
        }
        let steps = if write.steps.trim().is_empty() { "[]".to_string() } else { write.steps.clone() };
        let now = now_rfc3339();

        sqlx::query(
            "INSERT INTO runbooks (id, name, description, steps, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        )
        .bind(&id)
        .bind(&write.name)
        .bind(&write.description)
        .bind(&steps)
        .bind(write.enabled)
        .bind(&now)
        .execute(self.pool())
        .await
        .ctx("runbooks::insert")?;

        self.get_runbook(&id).await?.ok_or(DbError::NotFound)
    }

    pub async fn get_runbook(&self, id: &str) -> DbResult<Option<RunbookRow>> {
        sqlx::query_as("SELECT id, name, description, steps, enabled, created_at, updated_at FROM runbooks WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .ctx("runbooks::get")
    }

    /// Lists all runbooks ordered by name.
    pub async fn list_runbooks(&self) -> DbResult<Vec<RunbookRow>> {
        sqlx::query_as("SELECT id, name, description, steps, enabled, created_at, updated_at FROM runbooks ORDER BY name ASC")
            .fetch_all(self.pool())
            .await
            .ctx("runbooks::list")
    }

    pub async fn update_runbook(&self, write: &RunbookWrite) -> DbResult<()> {
        if write.id.is_empty() || write.name.trim().is_empty() {
            return Err(DbError::Validation("id and name are required".into()));
        }
        let steps = if write.steps.trim().is_empty() { "[]".to_string() } else { write.steps.clone() };
        let result = sqlx::query(
            "UPDATE runbooks SET name = ?1, description = ?2, steps = ?3, enabled = ?4, updated_at = ?5 WHERE id = ?6",
        )
        .bind(&write.name)
        .bind(&write.description)
        .bind(&steps)
        .bind(write.enabled)
        .bind(now_rfc3339())
        .bind(&write.id)
        .execute(self.pool())
        .await
        .ctx("runbooks::update")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_runbook(&self, id: &str) -> DbResult<()> {
        if id.is_empty() {
            return Err(DbError::NotFound);
        }
        let result = sqlx::query("DELETE FROM runbooks WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .ctx("runbooks::delete")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Runs a runbook synchronously to completion as a single transaction:
    /// queued → running → succeeded. Step execution itself is external
    /// (spec §6); this only records the lifecycle.
    pub async fn start_runbook(&self, runbook_id_value: &str, at: &str) -> DbResult<RunbookRunRow> {
        if runbook_id_value.is_empty() {
            return Err(DbError::NotFound);
        }
        let mut tx = self.pool().begin().await.ctx("runbooks::start::begin")?;

        let runbook: Option<(String, String)> = sqlx::query_as("SELECT name, steps FROM runbooks WHERE id = ?1")
            .bind(runbook_id_value)
            .fetch_optional(&mut *tx)
            .await
            .ctx("runbooks::start::lookup")?;
        let (runbook_name, steps_json) = runbook.ok_or(DbError::NotFound)?;
        let titles = step_titles(&steps_json);
        let total_steps = titles.len() as i64;

        let run_id = runbook_id();
        let now = if at.is_empty() { now_rfc3339() } else { at.to_string() };

        sqlx::query(
            "INSERT INTO runbook_runs (id, runbook_id, runbook_name, status, total_steps, completed_steps, current_step, created_at)
             VALUES (?1, ?2, ?3, 'queued', ?4, 0, '', ?5)",
        )
        .bind(&run_id)
        .bind(runbook_id_value)
        .bind(&runbook_name)
        .bind(total_steps)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .ctx("runbooks::start::insert")?;

        sqlx::query("UPDATE runbook_runs SET status = 'running', started_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(&run_id)
            .execute(&mut *tx)
            .await
            .ctx("runbooks::start::mark_running")?;

        let current_step = titles.last().cloned().unwrap_or_else(|| "completed".to_string());
        sqlx::query(
            "UPDATE runbook_runs SET status = 'succeeded', completed_steps = total_steps, current_step = ?1, finished_at = ?2 WHERE id = ?3",
        )
        .bind(&current_step)
        .bind(&now)
        .bind(&run_id)
        .execute(&mut *tx)
        .await
        .ctx("runbooks::start::mark_succeeded")?;

        tx.commit().await.ctx("runbooks::start::commit")?;
        self.get_run(&run_id).await?.ok_or(DbError::NotFound)
    }

    /// Creates a queued run, leaving execution to the caller.
    pub async fn create_run(&self, runbook_id_value: &str, at: &str) -> DbResult<RunbookRunRow> {
        let runbook = self.get_runbook(runbook_id_value).await?.ok_or(DbError::NotFound)?;
        let titles = step_titles(&runbook.steps);
        let run_id = runbook_id();
        let now = if at.is_empty() { now_rfc3339() } else { at.to_string() };
        let current_step = titles.first().cloned().unwrap_or_default();

        sqlx::query(
            "INSERT INTO runbook_runs (id, runbook_id, runbook_name, status, total_steps, completed_steps, current_step, created_at)
             VALUES (?1, ?2, ?3, 'queued', ?4, 0, ?5, ?6)",
        )
        .bind(&run_id)
        .bind(runbook_id_value)
        .bind(&runbook.name)
        .bind(titles.len() as i64)
        .bind(&current_step)
        .bind(&now)
        .execute(self.pool())
        .await
        .ctx("runbooks::create_run")?;

        self.get_run(&run_id).await?.ok_or(DbError::NotFound)
    }

    pub async fn get_run(&self, id: &str) -> DbResult<Option<RunbookRunRow>> {
        sqlx::query_as(&format!("SELECT {RUN_COLUMNS} FROM runbook_runs WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .ctx("runbooks::get_run")
    }

    pub async fn update_run(&self, write: &RunWrite) -> DbResult<()> {
        if write.id.is_empty() {
            return Err(DbError::NotFound);
        }
        let step_results = if write.step_results.trim().is_empty() { "[]".to_string() } else { write.step_results.clone() };
        let result = sqlx::query(
            "UPDATE runbook_runs SET status = ?1, completed_steps = ?2, current_step = ?3, error = ?4,
                    step_results = ?5, started_at = ?6, finished_at = ?7
             WHERE id = ?8",
        )
        .bind(&write.status)
        .bind(write.completed_steps)
        .bind(&write.current_step)
        .bind(&write.error)
        .bind(&step_results)
        .bind(&write.started_at)
        .bind(&write.finished_at)
        .bind(&write.id)
        .execute(self.pool())
        .await
        .ctx("runbooks::update_run")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_run(&self, id: &str) -> DbResult<()> {
        if id.is_empty() {
            return Err(DbError::NotFound);
        }
        let result = sqlx::query("DELETE FROM runbook_runs WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .ctx("runbooks::delete_run")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Idempotent restart cleanup: fails every `queued`/`running` run,
    /// appending a synthetic interrupted step result to running rows.
    /// Returns the number of affected runs.
    pub async fn fail_orphaned_runs(&self) -> DbResult<u64> {
        let now = now_rfc3339();
        let orphans: Vec<(String, String, i64, String, String)> = sqlx::query_as(
            "SELECT id, status, completed_steps, current_step, step_results FROM runbook_runs WHERE status IN ('queued', 'running')",
        )
        .fetch_all(self.pool())
        .await
        .ctx("runbooks::fail_orphaned::select")?;

        let mut affected = 0u64;
        for (id, status, completed_steps, current_step, step_results_json) in orphans {
            let step_results = if status == "running" {
                let mut results = parse_step_results(&step_results_json);
                results.push(StepResult {
                    step_index: completed_steps,
                    title: current_step,
                    kind: "interrupted".to_string(),
                    output: String::new(),
                    error: Some(ORPHAN_ERROR.to_string()),
                    duration_ms: 0,
                });
                serde_json::to_string(&results).unwrap_or(step_results_json)
            } else {
                step_results_json
            };

            sqlx::query(
                "UPDATE runbook_runs SET status = 'failed', error = ?1, finished_at = ?2, step_results = ?3 WHERE id = ?4",
            )
            .bind(ORPHAN_ERROR)
            .bind(&now)
            .bind(&step_results)
            .bind(&id)
            .execute(self.pool())
            .await
            .ctx("runbooks::fail_orphaned::update")?;
            affected += 1;
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps_with_titles(titles: &[&str]) -> String {
        let steps: Vec<Value> = titles
            .iter()
            .map(|t| serde_json::json!({"type": "command", "title": t, "command": "echo hi"}))
            .collect();
        serde_json::to_string(&Value::Array(steps)).unwrap()
    }

    #[tokio::test]
    async fn insert_requires_name_and_assigns_id() {
        let db = Database::open_in_memory().await.unwrap();
        let err = db.insert_runbook(&RunbookWrite::default()).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));

        let row = db
            .insert_runbook(&RunbookWrite { name: "Restart".into(), enabled: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(row.id.len(), 32);
        assert_eq!(row.steps, "[]");
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_runbook(&RunbookWrite { id: "rb-1".into(), name: "Restart".into(), ..Default::default() })
            .await
            .unwrap();
        let err = db
            .insert_runbook(&RunbookWrite { id: "rb-1".into(), name: "Other".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn start_runs_synchronously_to_success() {
        let db = Database::open_in_memory().await.unwrap();
        let runbook = db
            .insert_runbook(&RunbookWrite {
                name: "Cleanup".into(),
                steps: steps_with_titles(&["Clear cache", "Report space"]),
                enabled: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let run = db.start_runbook(&runbook.id, "t0").await.unwrap();
        assert_eq!(run.status, "succeeded");
        assert_eq!(run.total_steps, 2);
        assert_eq!(run.completed_steps, 2);
        assert_eq!(run.current_step, "Report space");
        assert!(!run.finished_at.is_empty());
    }

    #[tokio::test]
    async fn start_with_zero_steps_uses_completed_literal() {
        let db = Database::open_in_memory().await.unwrap();
        let runbook = db.insert_runbook(&RunbookWrite { name: "Noop".into(), ..Default::default() }).await.unwrap();
        let run = db.start_runbook(&runbook.id, "t0").await.unwrap();
        assert_eq!(run.current_step, "completed");
    }

    #[tokio::test]
    async fn scenario_orphan_reconciliation() {
        let db = Database::open_in_memory().await.unwrap();
        let runbook = db
            .insert_runbook(&RunbookWrite { name: "Diagnostics".into(), steps: steps_with_titles(&["Dump", "Report"]), ..Default::default() })
            .await
            .unwrap();

        let queued = db.create_run(&runbook.id, "t0").await.unwrap();

        let running = db.create_run(&runbook.id, "t0").await.unwrap();
        let first_result = StepResult { step_index: 0, title: "Dump".into(), kind: "command".into(), output: "ok".into(), error: None, duration_ms: 5 };
        db.update_run(&RunWrite {
            id: running.id.clone(),
            status: "running".into(),
            completed_steps: 1,
            current_step: "Report".into(),
            step_results: serde_json::to_string(&vec![first_result]).unwrap(),
            started_at: "t0".into(),
            ..Default::default()
        })
        .await
        .unwrap();

        let succeeded = db.start_runbook(&runbook.id, "t0").await.unwrap();

        let affected = db.fail_orphaned_runs().await.unwrap();
        assert_eq!(affected, 2);

        let queued_after = db.get_run(&queued.id).await.unwrap().unwrap();
        assert_eq!(queued_after.status, "failed");
        assert_eq!(queued_after.error, ORPHAN_ERROR);

        let running_after = db.get_run(&running.id).await.unwrap().unwrap();
        assert_eq!(running_after.status, "failed");
        let results = parse_step_results(&running_after.step_results);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].kind, "interrupted");
        assert_eq!(results[1].step_index, 1);

        let succeeded_after = db.get_run(&succeeded.id).await.unwrap().unwrap();
        assert_eq!(succeeded_after.status, "succeeded");

        assert_eq!(db.fail_orphaned_runs().await.unwrap(), 0);
    }
}
