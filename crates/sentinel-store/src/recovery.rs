// crates/sentinel-store/src/recovery.rs
//! Session recovery: content-addressed snapshots, the session state
//! machine, and restore job tracking (spec §3, §4.9).

use serde::Serialize;
use serde_json::Value;
use sqlx::{Sqlite, Transaction};

use sentinel_core::time::now_rfc3339;

use crate::error::{DbError, DbResult, ResultExt};
use crate::Database;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, PartialEq)]
pub struct RecoverySessionRow {
    pub name: String,
    pub state: String,
    pub latest_snapshot_id: i64,
    pub snapshot_hash: String,
    pub snapshot_at: String,
    pub last_boot_id: String,
    pub last_seen_at: String,
    pub killed_at: String,
    pub restored_at: String,
    pub archived_at: String,
    pub restore_error: String,
    pub windows: i64,
    pub panes: i64,
}

const SESSION_COLUMNS: &str =
    "name, state, latest_snapshot_id, snapshot_hash, snapshot_at, last_boot_id, last_seen_at, killed_at, restored_at, archived_at, restore_error, windows, panes";

#[derive(Debug, Clone, Default)]
pub struct SnapshotWrite {
    pub session_name: String,
    pub boot_id: String,
    pub state_hash: String,
    pub captured_at: String,
    pub active_window: i64,
    pub active_pane_id: String,
    pub windows: i64,
    pub panes: i64,
    pub payload_json: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, PartialEq, Eq)]
pub struct RecoverySnapshotRow {
    pub id: i64,
    pub session: String,
    pub boot_id: String,
    pub state_hash: String,
    pub captured_at: String,
    pub active_window: i64,
    pub active_pane_id: String,
    pub windows: i64,
    pub panes: i64,
    pub payload_json: String,
}

#[derive(Debug, Clone)]
pub struct SnapshotUpsertResult {
    pub snapshot: RecoverySnapshotRow,
    pub is_new: bool,
}

const SNAPSHOT_COLUMNS: &str = "id, session, boot_id, state_hash, captured_at, active_window, active_pane_id, windows, panes, payload_json";

#[derive(Debug, Clone, Default)]
pub struct RecoveryJobWrite {
    pub id: String,
    pub session: String,
    pub target_session: String,
    pub snapshot_id: i64,
    pub mode: String,
    pub conflict_policy: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, PartialEq, Eq)]
pub struct RecoveryJobRow {
    pub id: String,
    pub session: String,
    pub target_session: String,
    pub snapshot_id: i64,
    pub mode: String,
    pub conflict_policy: String,
    pub status: String,
    pub total_steps: i64,
    pub completed_steps: i64,
    pub current_step: String,
    pub error: String,
    pub created_at: String,
    pub started_at: String,
    pub finished_at: String,
}

const JOB_COLUMNS: &str =
    "id, session, target_session, snapshot_id, mode, conflict_policy, status, total_steps, completed_steps, current_step, error, created_at, started_at, finished_at";

async fn ensure_recovery_session(tx: &mut Transaction<'_, Sqlite>, name: &str) -> DbResult<()> {
    sqlx::query("INSERT OR IGNORE INTO recovery_sessions (name) VALUES (?1)")
        .bind(name)
        .execute(&mut **tx)
        .await
        .ctx("recovery::ensure_session")?;
    Ok(())
}

impl Database {
    pub async fn get_recovery_session(&self, name: &str) -> DbResult<Option<RecoverySessionRow>> {
        sqlx::query_as(&format!("SELECT {SESSION_COLUMNS} FROM recovery_sessions WHERE name = ?1"))
            .bind(name)
            .fetch_optional(self.pool())
            .await
            .ctx("recovery::get_session")
    }

    /// Transitions sessions currently `running` to `killed`. Blank names are
    /// skipped; `archived` sessions are left untouched.
    pub async fn mark_killed(&self, names: &[String], boot_id: &str, at: &str) -> DbResult<u64> {
        let at = if at.is_empty() { now_rfc3339() } else { at.to_string() };
        let mut affected = 0u64;
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let mut tx = self.pool().begin().await.ctx("recovery::mark_killed::begin")?;
            ensure_recovery_session(&mut tx, name).await?;
            let result = sqlx::query(
                "UPDATE recovery_sessions SET state = 'killed', killed_at = ?1, last_boot_id = ?2, last_seen_at = ?1
                 WHERE name = ?3 AND state = 'running'",
            )
            .bind(&at)
            .bind(boot_id)
            .bind(name)
            .execute(&mut *tx)
            .await
            .ctx("recovery::mark_killed::update")?;
            tx.commit().await.ctx("recovery::mark_killed::commit")?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }

    pub async fn mark_restoring(&self, name: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE recovery_sessions SET state = 'restoring' WHERE name = ?1 AND state = 'killed'")
            .bind(name)
            .execute(self.pool())
            .await
            .ctx("recovery::mark_restoring")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn mark_restored(&self, name: &str, at: &str) -> DbResult<()> {
        let at = if at.is_empty() { now_rfc3339() } else { at.to_string() };
        let result = sqlx::query(
            "UPDATE recovery_sessions SET state = 'restored', restored_at = ?1 WHERE name = ?2 AND state = 'restoring'",
        )
        .bind(&at)
        .bind(name)
        .execute(self.pool())
        .await
        .ctx("recovery::mark_restored")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn mark_restore_failed(&self, name: &str, restore_error: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE recovery_sessions SET state = 'killed', restore_error = ?1 WHERE name = ?2 AND state = 'restoring'",
        )
        .bind(restore_error)
        .bind(name)
        .execute(self.pool())
        .await
        .ctx("recovery::mark_restore_failed")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Archives a session from `running`, `killed`, or `restoring`.
    pub async fn mark_archived(&self, name: &str, at: &str) -> DbResult<()> {
        let at = if at.is_empty() { now_rfc3339() } else { at.to_string() };
        let result = sqlx::query(
            "UPDATE recovery_sessions SET state = 'archived', archived_at = ?1
             WHERE name = ?2 AND state IN ('running', 'killed', 'restoring')",
        )
        .bind(&at)
        .bind(name)
        .execute(self.pool())
        .await
        .ctx("recovery::mark_archived")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Inserts a snapshot, deduplicating by `state_hash` against the
    /// session's current hash. Resets the session to `running` whenever a
    /// genuinely new snapshot is recorded.
    pub async fn upsert_snapshot(&self, write: &SnapshotWrite) -> DbResult<SnapshotUpsertResult> {
        if write.session_name.is_empty() {
            return Err(DbError::Validation("session_name is required".into()));
        }
        let payload = write.payload_json.trim();
        if payload.is_empty() {
            return Err(DbError::Validation("payload_json is required".into()));
        }
        serde_json::from_str::<Value>(payload).map_err(|e| DbError::Validation(format!("payload_json is not valid JSON: {e}")))?;

        let mut tx = self.pool().begin().await.ctx("recovery::upsert_snapshot::begin")?;
        ensure_recovery_session(&mut tx, &write.session_name).await?;

        if !write.state_hash.is_empty() {
            let existing: Option<(String, i64)> =
                sqlx::query_as("SELECT snapshot_hash, latest_snapshot_id FROM recovery_sessions WHERE name = ?1")
                    .bind(&write.session_name)
                    .fetch_optional(&mut *tx)
                    .await
                    .ctx("recovery::upsert_snapshot::lookup")?;
            if let Some((hash, snapshot_id)) = existing {
                if hash == write.state_hash && snapshot_id > 0 {
                    let snapshot: RecoverySnapshotRow = sqlx::query_as(&format!("SELECT {SNAPSHOT_COLUMNS} FROM recovery_snapshots WHERE id = ?1"))
                        .bind(snapshot_id)
                        .fetch_one(&mut *tx)
                        .await
                        .ctx("recovery::upsert_snapshot::reload")?;
                    tx.commit().await.ctx("recovery::upsert_snapshot::commit")?;
                    return Ok(SnapshotUpsertResult { snapshot, is_new: false });
                }
            }
        }

        let captured_at = if write.captured_at.is_empty() { now_rfc3339() } else { write.captured_at.clone() };
        let snapshot_id: (i64,) = sqlx::query_as(
            "INSERT INTO recovery_snapshots (session, boot_id, state_hash, captured_at, active_window, active_pane_id, windows, panes, payload_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             RETURNING id",
        )
        .bind(&write.session_name)
        .bind(&write.boot_id)
        .bind(&write.state_hash)
        .bind(&captured_at)
        .bind(write.active_window)
        .bind(&write.active_pane_id)
        .bind(write.windows)
        .bind(write.panes)
        .bind(payload)
        .fetch_one(&mut *tx)
        .await
        .ctx("recovery::upsert_snapshot::insert")?;

        sqlx::query(
            "UPDATE recovery_sessions
             SET state = 'running', latest_snapshot_id = ?1, snapshot_hash = ?2, snapshot_at = ?3,
                 last_boot_id = ?4, killed_at = '', windows = ?5, panes = ?6
             WHERE name = ?7",
        )
        .bind(snapshot_id.0)
        .bind(&write.state_hash)
        .bind(&captured_at)
        .bind(&write.boot_id)
        .bind(write.windows)
        .bind(write.panes)
        .bind(&write.session_name)
        .execute(&mut *tx)
        .await
        .ctx("recovery::upsert_snapshot::update_session")?;

        let snapshot: RecoverySnapshotRow = sqlx::query_as(&format!("SELECT {SNAPSHOT_COLUMNS} FROM recovery_snapshots WHERE id = ?1"))
            .bind(snapshot_id.0)
            .fetch_one(&mut *tx)
            .await
            .ctx("recovery::upsert_snapshot::reload_new")?;
        tx.commit().await.ctx("recovery::upsert_snapshot::commit")?;
        Ok(SnapshotUpsertResult { snapshot, is_new: true })
    }

    pub async fn list_snapshots(&self, session: &str) -> DbResult<Vec<RecoverySnapshotRow>> {
        sqlx::query_as(&format!("SELECT {SNAPSHOT_COLUMNS} FROM recovery_snapshots WHERE session = ?1 ORDER BY id DESC"))
            .bind(session)
            .fetch_all(self.pool())
            .await
            .ctx("recovery::list_snapshots")
    }

    /// Renames a recovery session and every related snapshot/job row in one
    /// transaction. Identical or empty names are no-ops.
    pub async fn rename_recovery_session(&self, old: &str, new: &str) -> DbResult<()> {
        if old.is_empty() || new.is_empty() || old == new {
            return Ok(());
        }
        let mut tx = self.pool().begin().await.ctx("recovery::rename::begin")?;
        sqlx::query("UPDATE recovery_sessions SET name = ?1 WHERE name = ?2")
            .bind(new)
            .bind(old)
            .execute(&mut *tx)
            .await
            .ctx("recovery::rename::sessions")?;
        sqlx::query("UPDATE recovery_snapshots SET session = ?1 WHERE session = ?2")
            .bind(new)
            .bind(old)
            .execute(&mut *tx)
            .await
            .ctx("recovery::rename::snapshots")?;
        sqlx::query("UPDATE recovery_jobs SET session = ?1 WHERE session = ?2")
            .bind(new)
            .bind(old)
            .execute(&mut *tx)
            .await
            .ctx("recovery::rename::jobs")?;
        tx.commit().await.ctx("recovery::rename::commit")?;
        Ok(())
    }

    /// Keeps the newest `max_per_session` snapshots for every session with
    /// any snapshots. Zero is a no-op.
    pub async fn trim_snapshots(&self, max_per_session: i64) -> DbResult<u64> {
        if max_per_session <= 0 {
            return Ok(0);
        }
        let sessions: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT session FROM recovery_snapshots")
            .fetch_all(self.pool())
            .await
            .ctx("recovery::trim_snapshots::sessions")?;
        let mut deleted = 0u64;
        for (session,) in sessions {
            let result = sqlx::query(
                "DELETE FROM recovery_snapshots WHERE session = ?1 AND id NOT IN (
                    SELECT id FROM recovery_snapshots WHERE session = ?1 ORDER BY id DESC LIMIT ?2
                 )",
            )
            .bind(&session)
            .bind(max_per_session)
            .execute(self.pool())
            .await
            .ctx("recovery::trim_snapshots::delete")?;
            deleted += result.rows_affected();
        }
        Ok(deleted)
    }

    pub async fn insert_recovery_job(&self, write: &RecoveryJobWrite) -> DbResult<RecoveryJobRow> {
        if write.id.is_empty() || write.session.is_empty() {
            return Err(DbError::Validation("id and session are required".into()));
        }
        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO recovery_jobs (id, session, target_session, snapshot_id, mode, conflict_policy, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'queued', ?7)",
        )
        .bind(&write.id)
        .bind(&write.session)
        .bind(&write.target_session)
        .bind(write.snapshot_id)
        .bind(&write.mode)
        .bind(&write.conflict_policy)
        .bind(&now)
        .execute(self.pool())
        .await
        .ctx("recovery::insert_job")?;
        self.get_recovery_job(&write.id).await?.ok_or(DbError::NotFound)
    }

    pub async fn get_recovery_job(&self, id: &str) -> DbResult<Option<RecoveryJobRow>> {
        sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM recovery_jobs WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .ctx("recovery::get_job")
    }

    pub async fn set_job_running(&self, id: &str, at: &str) -> DbResult<()> {
        let at = if at.is_empty() { now_rfc3339() } else { at.to_string() };
        let result = sqlx::query("UPDATE recovery_jobs SET status = 'running', started_at = ?1 WHERE id = ?2 AND status = 'queued'")
            .bind(&at)
            .bind(id)
            .execute(self.pool())
            .await
            .ctx("recovery::set_job_running")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn update_job_progress(&self, id: &str, completed_steps: i64, current_step: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE recovery_jobs SET completed_steps = ?1, current_step = ?2 WHERE id = ?3")
            .bind(completed_steps)
            .bind(current_step)
            .bind(id)
            .execute(self.pool())
            .await
            .ctx("recovery::update_job_progress")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn update_job_target(&self, id: &str, target_session: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE recovery_jobs SET target_session = ?1 WHERE id = ?2")
            .bind(target_session)
            .bind(id)
            .execute(self.pool())
            .await
            .ctx("recovery::update_job_target")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn finish_recovery_job(&self, id: &str, status: &str, error: &str, at: &str) -> DbResult<()> {
        let at = if at.is_empty() { now_rfc3339() } else { at.to_string() };
        let result = sqlx::query("UPDATE recovery_jobs SET status = ?1, error = ?2, finished_at = ?3 WHERE id = ?4")
            .bind(status)
            .bind(error)
            .bind(&at)
            .bind(id)
            .execute(self.pool())
            .await
            .ctx("recovery::finish_job")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Jobs matching any of `status_filters` (empty ⇒ all), newest first.
    /// `limit<=0` defaults to 100.
    pub async fn list_recovery_jobs(&self, status_filters: &[String], limit: i64) -> DbResult<Vec<RecoveryJobRow>> {
        let limit = if limit <= 0 { 100 } else { limit };
        if status_filters.is_empty() {
            return sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM recovery_jobs ORDER BY created_at DESC LIMIT ?1"))
                .bind(limit)
                .fetch_all(self.pool())
                .await
                .ctx("recovery::list_jobs");
        }
        let placeholders = (1..=status_filters.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        let sql = format!("SELECT {JOB_COLUMNS} FROM recovery_jobs WHERE status IN ({placeholders}) ORDER BY created_at DESC LIMIT ?{}", status_filters.len() + 1);
        let mut query = sqlx::query_as(&sql);
        for status in status_filters {
            query = query.bind(status);
        }
        query.bind(limit).fetch_all(self.pool()).await.ctx("recovery::list_jobs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scenario_snapshot_dedup_and_reset_on_kill() {
        let db = Database::open_in_memory().await.unwrap();
        let first = db
            .upsert_snapshot(&SnapshotWrite { session_name: "dev".into(), state_hash: "h1".into(), payload_json: "{}".into(), ..Default::default() })
            .await
            .unwrap();
        assert!(first.is_new);

        let dup = db
            .upsert_snapshot(&SnapshotWrite { session_name: "dev".into(), state_hash: "h1".into(), payload_json: "{}".into(), ..Default::default() })
            .await
            .unwrap();
        assert!(!dup.is_new);
        assert_eq!(dup.snapshot.id, first.snapshot.id);

        db.mark_killed(&["dev".to_string()], "boot-2", "").await.unwrap();
        let killed = db.get_recovery_session("dev").await.unwrap().unwrap();
        assert_eq!(killed.state, "killed");

        let second = db
            .upsert_snapshot(&SnapshotWrite { session_name: "dev".into(), state_hash: "h2".into(), payload_json: "{}".into(), ..Default::default() })
            .await
            .unwrap();
        assert!(second.is_new);
        let restarted = db.get_recovery_session("dev").await.unwrap().unwrap();
        assert_eq!(restarted.state, "running");
        assert_eq!(restarted.killed_at, "");
    }

    #[tokio::test]
    async fn upsert_snapshot_rejects_invalid_payload() {
        let db = Database::open_in_memory().await.unwrap();
        let err = db
            .upsert_snapshot(&SnapshotWrite { session_name: "dev".into(), payload_json: "not json".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn state_machine_transitions() {
        let db = Database::open_in_memory().await.unwrap();
        db.mark_killed(&["dev".to_string()], "boot-1", "t0").await.unwrap();
        db.mark_restoring("dev").await.unwrap();
        db.mark_restored("dev", "t1").await.unwrap();
        let row = db.get_recovery_session("dev").await.unwrap().unwrap();
        assert_eq!(row.state, "restored");

        // `restored` is not one of the three documented archive source
        // states (running, killed, restoring); archiving from it fails.
        let err = db.mark_archived("dev", "t2").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
        let row = db.get_recovery_session("dev").await.unwrap().unwrap();
        assert_eq!(row.state, "restored");
    }

    #[tokio::test]
    async fn mark_archived_accepts_running_killed_and_restoring() {
        let db = Database::open_in_memory().await.unwrap();

        // A snapshot upsert implicitly creates the session in the default
        // `running` state (spec's recovery_sessions default).
        db.upsert_snapshot(&SnapshotWrite { session_name: "running-session".into(), payload_json: "{}".into(), ..Default::default() })
            .await
            .unwrap();
        db.mark_archived("running-session", "t0").await.unwrap();
        assert_eq!(db.get_recovery_session("running-session").await.unwrap().unwrap().state, "archived");

        db.mark_killed(&["killed-session".to_string()], "boot-1", "t0").await.unwrap();
        db.mark_archived("killed-session", "t1").await.unwrap();
        assert_eq!(db.get_recovery_session("killed-session").await.unwrap().unwrap().state, "archived");

        db.mark_killed(&["restoring-session".to_string()], "boot-1", "t0").await.unwrap();
        db.mark_restoring("restoring-session").await.unwrap();
        db.mark_archived("restoring-session", "t1").await.unwrap();
        assert_eq!(db.get_recovery_session("restoring-session").await.unwrap().unwrap().state, "archived");

        let err = db.mark_archived("restoring-session", "t2").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[tokio::test]
    async fn trim_snapshots_keeps_newest_per_session() {
        let db = Database::open_in_memory().await.unwrap();
        for i in 0..5 {
            db.upsert_snapshot(&SnapshotWrite { session_name: "dev".into(), state_hash: format!("h{i}"), payload_json: "{}".into(), ..Default::default() })
                .await
                .unwrap();
        }
        let trimmed = db.trim_snapshots(2).await.unwrap();
        assert_eq!(trimmed, 3);
        assert_eq!(db.list_snapshots("dev").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rename_moves_sessions_snapshots_and_jobs() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert_snapshot(&SnapshotWrite { session_name: "dev".into(), payload_json: "{}".into(), ..Default::default() }).await.unwrap();
        db.insert_recovery_job(&RecoveryJobWrite { id: "job-1".into(), session: "dev".into(), ..Default::default() }).await.unwrap();

        db.rename_recovery_session("dev", "dev2").await.unwrap();
        assert!(db.get_recovery_session("dev").await.unwrap().is_none());
        assert!(db.get_recovery_session("dev2").await.unwrap().is_some());
        assert_eq!(db.list_snapshots("dev2").await.unwrap().len(), 1);
        let job = db.get_recovery_job("job-1").await.unwrap().unwrap();
        assert_eq!(job.session, "dev2");
    }

    #[tokio::test]
    async fn job_lifecycle_and_listing() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_recovery_job(&RecoveryJobWrite { id: "job-1".into(), session: "dev".into(), ..Default::default() }).await.unwrap();
        db.set_job_running("job-1", "t0").await.unwrap();
        db.update_job_progress("job-1", 1, "restore windows").await.unwrap();
        db.finish_recovery_job("job-1", "succeeded", "", "t1").await.unwrap();

        let jobs = db.list_recovery_jobs(&["succeeded".to_string()], 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].completed_steps, 1);
    }
}
