// crates/sentinel-store/src/watchtower/journal.rs
//! The global change journal (spec §3 "Journal", §4.3). `global_rev` is a
//! single source of authority maintained in `runtime_kv` (see
//! `Database::watchtower_global_revision`); this module only stores and
//! reads journal rows stamped with whatever `global_rev` the caller supplies.

use sentinel_core::time::{is_unset, now_rfc3339};

use super::{JournalEntry, JournalWrite};
use crate::error::{DbError, DbResult, ResultExt};
use crate::Database;

impl Database {
    /// Inserts one journal row. `entity_type` is required; `changed_at`
    /// defaults to now when left empty.
    pub async fn insert_journal(&self, write: &JournalWrite) -> DbResult<()> {
        if write.entity_type.is_empty() {
            return Err(DbError::Validation("entity_type is required".into()));
        }
        let changed_at = if is_unset(&write.changed_at) {
            now_rfc3339()
        } else {
            write.changed_at.clone()
        };

        sqlx::query(
            "INSERT INTO journal (global_rev, entity_type, session, window_index, pane_id, change_kind, changed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(write.global_rev)
        .bind(&write.entity_type)
        .bind(&write.session)
        .bind(write.window_index)
        .bind(&write.pane_id)
        .bind(&write.change_kind)
        .bind(changed_at)
        .execute(self.pool())
        .await
        .ctx("watchtower::insert_journal")?;
        Ok(())
    }

    /// Journal entries with `global_rev > rev`, ordered `(global_rev, id)`
    /// ascending, capped at `limit`.
    pub async fn list_journal_since(&self, rev: i64, limit: i64) -> DbResult<Vec<JournalEntry>> {
        sqlx::query_as(
            "SELECT id, global_rev, entity_type, session, window_index, pane_id, change_kind, changed_at
             FROM journal WHERE global_rev > ?1 ORDER BY global_rev ASC, id ASC LIMIT ?2",
        )
        .bind(rev)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .ctx("watchtower::list_journal_since")
    }

    /// Keeps the `max_rows` newest journal rows by `(global_rev, id)`
    /// descending. Zero or negative is a no-op.
    pub async fn prune_journal(&self, max_rows: i64) -> DbResult<u64> {
        if max_rows <= 0 {
            return Ok(0);
        }
        let result = sqlx::query(
            "DELETE FROM journal WHERE id NOT IN (
                SELECT id FROM journal ORDER BY global_rev DESC, id DESC LIMIT ?1
             )",
        )
        .bind(max_rows)
        .execute(self.pool())
        .await
        .ctx("watchtower::prune_journal")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn insert_requires_entity_type() {
        let db = Database::open_in_memory().await.unwrap();
        let err = db
            .insert_journal(&JournalWrite { global_rev: 1, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn list_since_is_ordered_and_exclusive() {
        let db = Database::open_in_memory().await.unwrap();
        for rev in [1, 2, 3] {
            db.insert_journal(&JournalWrite {
                global_rev: rev,
                entity_type: "session".into(),
                session: "dev".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        }
        let entries = db.list_journal_since(1, 10).await.unwrap();
        assert_eq!(entries.iter().map(|e| e.global_rev).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn prune_keeps_newest_by_global_rev() {
        let db = Database::open_in_memory().await.unwrap();
        for rev in 1..=5 {
            db.insert_journal(&JournalWrite { global_rev: rev, entity_type: "session".into(), ..Default::default() })
                .await
                .unwrap();
        }
        let pruned = db.prune_journal(2).await.unwrap();
        assert_eq!(pruned, 3);
        let remaining = db.list_journal_since(0, 10).await.unwrap();
        assert_eq!(remaining.iter().map(|e| e.global_rev).collect::<Vec<_>>(), vec![4, 5]);
    }

    #[tokio::test]
    async fn prune_with_nonpositive_is_noop() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_journal(&JournalWrite { global_rev: 1, entity_type: "session".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(db.prune_journal(0).await.unwrap(), 0);
        assert_eq!(db.prune_journal(-5).await.unwrap(), 0);
    }
}
