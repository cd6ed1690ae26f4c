// crates/sentinel-store/src/storage_admin.rs
//! Aggregate size/row statistics and targeted flush operations (spec §4.10).

use serde::Serialize;

use crate::error::{DbError, DbResult, ResultExt};
use crate::Database;

const RESOURCE_TIMELINE: &str = "timeline";
const RESOURCE_ACTIVITY_JOURNAL: &str = "activity-journal";
const RESOURCE_GUARDRAIL_AUDIT: &str = "guardrail-audit";
const RESOURCE_RECOVERY_HISTORY: &str = "recovery-history";
const RESOURCE_ALL: &str = "all";

const KNOWN_RESOURCES: &[&str] = &[RESOURCE_TIMELINE, RESOURCE_ACTIVITY_JOURNAL, RESOURCE_GUARDRAIL_AUDIT, RESOURCE_RECOVERY_HISTORY];

/// Trims and lowercases a caller-supplied resource name.
pub fn normalize_storage_resource(resource: &str) -> String {
    resource.trim().to_ascii_lowercase()
}

/// Whether `resource` (after normalization) names a known resource or `"all"`.
pub fn is_storage_resource(resource: &str) -> bool {
    let normalized = normalize_storage_resource(resource);
    normalized == RESOURCE_ALL || KNOWN_RESOURCES.contains(&normalized.as_str())
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResourceStats {
    pub resource: String,
    pub rows: i64,
    pub bytes: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DbFileSizes {
    pub main_db: u64,
    pub wal: u64,
    pub shm: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StorageStats {
    pub resources: Vec<ResourceStats>,
    pub files: DbFileSizes,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FlushResult {
    pub resource: String,
    pub rows_deleted: u64,
}

fn file_size(path: &std::path::Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

impl Database {
    async fn resource_stats(&self, resource: &str) -> DbResult<ResourceStats> {
        let (rows, bytes): (i64, i64) = match resource {
            RESOURCE_TIMELINE => sqlx::query_as(
                "SELECT COUNT(*), COALESCE(SUM(LENGTH(session) + LENGTH(pane_id) + LENGTH(event_type) + LENGTH(severity)
                    + LENGTH(command) + LENGTH(cwd) + LENGTH(summary) + LENGTH(details) + LENGTH(marker)
                    + LENGTH(metadata) + LENGTH(created_at)), 0)
                 FROM timeline_events",
            )
            .fetch_one(self.pool())
            .await
            .ctx("storage_admin::stats::timeline")?,
            RESOURCE_ACTIVITY_JOURNAL => sqlx::query_as(
                "SELECT COUNT(*), COALESCE(SUM(LENGTH(entity_type) + LENGTH(session) + LENGTH(pane_id)
                    + LENGTH(change_kind) + LENGTH(changed_at)), 0)
                 FROM journal",
            )
            .fetch_one(self.pool())
            .await
            .ctx("storage_admin::stats::activity_journal")?,
            RESOURCE_GUARDRAIL_AUDIT => sqlx::query_as(
                "SELECT COUNT(*), COALESCE(SUM(LENGTH(rule_id) + LENGTH(decision) + LENGTH(action) + LENGTH(command)
                    + LENGTH(session) + LENGTH(pane_id) + LENGTH(reason) + LENGTH(metadata) + LENGTH(created_at)), 0)
                 FROM guardrail_audit",
            )
            .fetch_one(self.pool())
            .await
            .ctx("storage_admin::stats::guardrail_audit")?,
            RESOURCE_RECOVERY_HISTORY => {
                let (snapshot_rows, snapshot_bytes): (i64, i64) = sqlx::query_as(
                    "SELECT COUNT(*), COALESCE(SUM(LENGTH(session) + LENGTH(boot_id) + LENGTH(state_hash)
                        + LENGTH(captured_at) + LENGTH(active_pane_id) + LENGTH(payload_json)), 0)
                     FROM recovery_snapshots",
                )
                .fetch_one(self.pool())
                .await
                .ctx("storage_admin::stats::recovery_snapshots")?;
                let (job_rows, job_bytes): (i64, i64) = sqlx::query_as(
                    "SELECT COUNT(*), COALESCE(SUM(LENGTH(session) + LENGTH(target_session) + LENGTH(mode)
                        + LENGTH(conflict_policy) + LENGTH(status) + LENGTH(current_step) + LENGTH(error)
                        + LENGTH(created_at)), 0)
                     FROM recovery_jobs",
                )
                .fetch_one(self.pool())
                .await
                .ctx("storage_admin::stats::recovery_jobs")?;
                (snapshot_rows + job_rows, snapshot_bytes + job_bytes)
            }
            other => return Err(DbError::InvalidStorageResource(other.to_string())),
        };
        Ok(ResourceStats { resource: resource.to_string(), rows, bytes })
    }

    /// Row counts and approximate byte sizes for every known resource, plus
    /// best-effort on-disk file sizes.
    pub async fn get_storage_stats(&self) -> DbResult<StorageStats> {
        let mut resources = Vec::with_capacity(KNOWN_RESOURCES.len());
        for resource in KNOWN_RESOURCES {
            resources.push(self.resource_stats(resource).await?);
        }
        let main_db = file_size(self.db_path());
        let wal = file_size(&self.db_path().with_extension("db-wal"));
        let shm = file_size(&self.db_path().with_extension("db-shm"));
        Ok(StorageStats { resources, files: DbFileSizes { main_db, wal, shm } })
    }

    /// Deletes all rows of `resource` (or every resource, for `"all"`)
    /// atomically, then issues a best-effort WAL checkpoint-truncate.
    pub async fn flush_storage_resource(&self, resource: &str) -> DbResult<Vec<FlushResult>> {
        let normalized = normalize_storage_resource(resource);
        if !is_storage_resource(&normalized) {
            return Err(DbError::InvalidStorageResource(resource.to_string()));
        }
        let targets: Vec<&str> = if normalized == RESOURCE_ALL { KNOWN_RESOURCES.to_vec() } else { vec![normalized.as_str()] };

        let mut tx = self.pool().begin().await.ctx("storage_admin::flush::begin")?;
        let mut results = Vec::with_capacity(targets.len());
        for target in &targets {
            let rows_deleted = match *target {
                RESOURCE_TIMELINE => sqlx::query("DELETE FROM timeline_events").execute(&mut *tx).await,
                RESOURCE_ACTIVITY_JOURNAL => sqlx::query("DELETE FROM journal").execute(&mut *tx).await,
                RESOURCE_GUARDRAIL_AUDIT => sqlx::query("DELETE FROM guardrail_audit").execute(&mut *tx).await,
                RESOURCE_RECOVERY_HISTORY => {
                    let snapshots = sqlx::query("DELETE FROM recovery_snapshots").execute(&mut *tx).await.ctx("storage_admin::flush::recovery_snapshots")?;
                    let jobs = sqlx::query("DELETE FROM recovery_jobs").execute(&mut *tx).await.ctx("storage_admin::flush::recovery_jobs")?;
                    sqlx::query(
                        "UPDATE recovery_sessions SET latest_snapshot_id = 0, snapshot_hash = '', snapshot_at = '', windows = 0, panes = 0",
                    )
                    .execute(&mut *tx)
                    .await
                    .ctx("storage_admin::flush::recovery_sessions_reset")?;
                    results.push(FlushResult { resource: RESOURCE_RECOVERY_HISTORY.to_string(), rows_deleted: snapshots.rows_affected() + jobs.rows_affected() });
                    continue;
                }
                _ => unreachable!("validated above"),
            }
            .ctx("storage_admin::flush::delete")?;
            results.push(FlushResult { resource: target.to_string(), rows_deleted: rows_deleted.rows_affected() });
        }
        tx.commit().await.ctx("storage_admin::flush::commit")?;

        if let Err(error) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(self.pool()).await {
            tracing::warn!(%error, "wal checkpoint truncate failed after flush");
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrails::GuardrailAuditWrite;
    use crate::recovery::{RecoveryJobWrite, SnapshotWrite};
    use crate::timeline::TimelineEventWrite;
    use crate::watchtower::JournalWrite;

    #[test]
    fn is_storage_resource_accepts_all_case_insensitively() {
        assert!(is_storage_resource("ALL"));
        assert!(is_storage_resource(" Timeline "));
        assert!(!is_storage_resource("bogus"));
    }

    #[tokio::test]
    async fn scenario_flush_all_zeroes_every_resource() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_timeline_event(&TimelineEventWrite::default()).await.unwrap();
        db.insert_journal(&JournalWrite { global_rev: 1, entity_type: "session".into(), ..Default::default() }).await.unwrap();
        db.insert_guardrail_audit(&GuardrailAuditWrite::default()).await.unwrap();
        db.upsert_snapshot(&SnapshotWrite { session_name: "dev".into(), payload_json: "{}".into(), ..Default::default() }).await.unwrap();
        db.insert_recovery_job(&RecoveryJobWrite { id: "job-1".into(), session: "dev".into(), ..Default::default() }).await.unwrap();

        let before = db.get_storage_stats().await.unwrap();
        for resource in &before.resources {
            assert!(resource.rows >= 1, "{} should have rows before flush", resource.resource);
        }

        let flushed = db.flush_storage_resource("all").await.unwrap();
        assert_eq!(flushed.len(), 4);

        let after = db.get_storage_stats().await.unwrap();
        for resource in &after.resources {
            assert_eq!(resource.rows, 0, "{} should be empty after flush", resource.resource);
        }
    }

    #[tokio::test]
    async fn flush_rejects_unknown_resource() {
        let db = Database::open_in_memory().await.unwrap();
        let err = db.flush_storage_resource("bogus").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidStorageResource(_)));
    }
}
