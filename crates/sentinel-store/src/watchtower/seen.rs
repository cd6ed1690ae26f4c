// crates/sentinel-store/src/watchtower/seen.rs
//! "Seen" semantics (spec §4.3): marking panes as read, and the
//! recompute-on-seen transaction that is the sole place the denormalised
//! `unread_*`/`has_unread`/`rev` counters on windows and sessions are
//! reconciled from the pane table. Every other write trusts the collector's
//! incremental accounting (spec §9 "Denormalised counters").

use sqlx::{Sqlite, Transaction};

use crate::error::{DbResult, ResultExt};
use crate::Database;

/// Recomputes every window's `unread_panes`/`has_unread` from the pane
/// table, bumping `rev` only on rows that actually changed, then aggregates
/// the session's `unread_windows`/`unread_panes` from its windows, bumping
/// the session `rev` only if the aggregate changed.
async fn recompute_unread(tx: &mut Transaction<'_, Sqlite>, session: &str) -> DbResult<()> {
    let window_indices: Vec<(i64,)> =
        sqlx::query_as("SELECT window_index FROM watchtower_windows WHERE session = ?1")
            .bind(session)
            .fetch_all(&mut **tx)
            .await
            .ctx("watchtower::recompute_unread::windows")?;

    for (window_index,) in window_indices {
        let (unread_panes,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM watchtower_panes
             WHERE session = ?1 AND window_index = ?2 AND revision > seen_revision",
        )
        .bind(session)
        .bind(window_index)
        .fetch_one(&mut **tx)
        .await
        .ctx("watchtower::recompute_unread::count_panes")?;
        let has_unread = unread_panes > 0;

        let (current_unread, current_has_unread): (i64, bool) = sqlx::query_as(
            "SELECT unread_panes, has_unread FROM watchtower_windows WHERE session = ?1 AND window_index = ?2",
        )
        .bind(session)
        .bind(window_index)
        .fetch_one(&mut **tx)
        .await
        .ctx("watchtower::recompute_unread::window_row")?;

        if current_unread != unread_panes || current_has_unread != has_unread {
            sqlx::query(
                "UPDATE watchtower_windows
                 SET unread_panes = ?1, has_unread = ?2, rev = rev + 1
                 WHERE session = ?3 AND window_index = ?4",
            )
            .bind(unread_panes)
            .bind(has_unread)
            .bind(session)
            .bind(window_index)
            .execute(&mut **tx)
            .await
            .ctx("watchtower::recompute_unread::update_window")?;
        }
    }

    let (unread_windows, unread_panes): (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(has_unread), 0), COALESCE(SUM(unread_panes), 0)
         FROM watchtower_windows WHERE session = ?1",
    )
    .bind(session)
    .fetch_one(&mut **tx)
    .await
    .ctx("watchtower::recompute_unread::aggregate")?;

    let existing: Option<(i64, i64)> = sqlx::query_as(
        "SELECT unread_windows, unread_panes FROM watchtower_sessions WHERE name = ?1",
    )
    .bind(session)
    .fetch_optional(&mut **tx)
    .await
    .ctx("watchtower::recompute_unread::session_row")?;

    if let Some((existing_windows, existing_panes)) = existing {
        if existing_windows != unread_windows || existing_panes != unread_panes {
            sqlx::query(
                "UPDATE watchtower_sessions
                 SET unread_windows = ?1, unread_panes = ?2, rev = rev + 1
                 WHERE name = ?3",
            )
            .bind(unread_windows)
            .bind(unread_panes)
            .bind(session)
            .execute(&mut **tx)
            .await
            .ctx("watchtower::recompute_unread::update_session")?;
        }
    }

    Ok(())
}

impl Database {
    /// Marks one pane as seen. Returns whether the pane's `seen_revision`
    /// actually advanced.
    pub async fn mark_pane_seen(&self, session: &str, pane_id: &str) -> DbResult<bool> {
        let mut tx = self.pool().begin().await.ctx("watchtower::mark_pane_seen::begin")?;
        let result = sqlx::query(
            "UPDATE watchtower_panes SET seen_revision = revision
             WHERE session = ?1 AND pane_id = ?2 AND revision > seen_revision",
        )
        .bind(session)
        .bind(pane_id)
        .execute(&mut *tx)
        .await
        .ctx("watchtower::mark_pane_seen::update")?;
        let affected = result.rows_affected() > 0;

        recompute_unread(&mut tx, session).await?;
        tx.commit().await.ctx("watchtower::mark_pane_seen::commit")?;
        Ok(affected)
    }

    /// Marks every pane within one window as seen. Returns whether any pane
    /// was affected.
    pub async fn mark_window_seen(&self, session: &str, window_index: i64) -> DbResult<bool> {
        let mut tx = self.pool().begin().await.ctx("watchtower::mark_window_seen::begin")?;
        let result = sqlx::query(
            "UPDATE watchtower_panes SET seen_revision = revision
             WHERE session = ?1 AND window_index = ?2 AND revision > seen_revision",
        )
        .bind(session)
        .bind(window_index)
        .execute(&mut *tx)
        .await
        .ctx("watchtower::mark_window_seen::update")?;
        let affected = result.rows_affected() > 0;

        recompute_unread(&mut tx, session).await?;
        tx.commit().await.ctx("watchtower::mark_window_seen::commit")?;
        Ok(affected)
    }

    /// Marks every pane of a session as seen. Returns whether any pane was
    /// affected.
    pub async fn mark_session_seen(&self, session: &str) -> DbResult<bool> {
        let mut tx = self.pool().begin().await.ctx("watchtower::mark_session_seen::begin")?;
        let result = sqlx::query(
            "UPDATE watchtower_panes SET seen_revision = revision
             WHERE session = ?1 AND revision > seen_revision",
        )
        .bind(session)
        .execute(&mut *tx)
        .await
        .ctx("watchtower::mark_session_seen::update")?;
        let affected = result.rows_affected() > 0;

        recompute_unread(&mut tx, session).await?;
        tx.commit().await.ctx("watchtower::mark_session_seen::commit")?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchtower::{PaneWrite, SessionWrite, WindowWrite};
    use crate::Database;

    async fn seed_two_window_session(db: &Database) {
        db.upsert_watchtower_session(&SessionWrite { name: "dev".into(), ..Default::default() })
            .await
            .unwrap();
        for idx in [0, 1] {
            db.upsert_watchtower_window(&WindowWrite { session: "dev".into(), window_index: idx, ..Default::default() })
                .await
                .unwrap();
        }
        // window 0: pane %1 revision=3 seen=1 (unread)
        db.upsert_watchtower_pane(&PaneWrite {
            pane_id: "%1".into(), session: "dev".into(), window_index: 0,
            revision: 3, seen_revision: 1, ..Default::default()
        }).await.unwrap();
        // window 0: pane %2 revision=2 seen=2 (read)
        db.upsert_watchtower_pane(&PaneWrite {
            pane_id: "%2".into(), session: "dev".into(), window_index: 0,
            revision: 2, seen_revision: 2, ..Default::default()
        }).await.unwrap();
        // window 1: pane %3 revision=7 seen=0 (unread)
        db.upsert_watchtower_pane(&PaneWrite {
            pane_id: "%3".into(), session: "dev".into(), window_index: 1,
            revision: 7, seen_revision: 0, ..Default::default()
        }).await.unwrap();
    }

    #[tokio::test]
    async fn scenario_unread_recompute_across_mark_operations() {
        let db = Database::open_in_memory().await.unwrap();
        seed_two_window_session(&db).await;

        let changed = db.mark_window_seen("dev", 1).await.unwrap();
        assert!(changed);

        let pane3: (i64,) = sqlx::query_as("SELECT seen_revision FROM watchtower_panes WHERE pane_id = '%3'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(pane3.0, 7);

        let session = db.get_watchtower_session("dev").await.unwrap().unwrap();
        assert_eq!(session.unread_panes, 1);
        assert_eq!(session.unread_windows, 1);

        let first = db.mark_session_seen("dev").await.unwrap();
        assert!(first);
        let session = db.get_watchtower_session("dev").await.unwrap().unwrap();
        assert_eq!(session.unread_panes, 0);
        assert_eq!(session.unread_windows, 0);

        let second = db.mark_session_seen("dev").await.unwrap();
        assert!(!second, "second call with nothing left unread should report no change");
    }

    #[tokio::test]
    async fn mark_pane_seen_bumps_window_rev_only_when_unread_changes() {
        let db = Database::open_in_memory().await.unwrap();
        seed_two_window_session(&db).await;

        let before = db.list_watchtower_windows("dev").await.unwrap();
        let window0_rev_before = before.iter().find(|w| w.window_index == 0).unwrap().rev;

        db.mark_pane_seen("dev", "%1").await.unwrap();

        let after = db.list_watchtower_windows("dev").await.unwrap();
        let window0_rev_after = after.iter().find(|w| w.window_index == 0).unwrap().rev;
        assert!(window0_rev_after > window0_rev_before);

        // Marking it seen again changes nothing, so rev should not bump further.
        db.mark_pane_seen("dev", "%1").await.unwrap();
        let after2 = db.list_watchtower_windows("dev").await.unwrap();
        let window0_rev_after2 = after2.iter().find(|w| w.window_index == 0).unwrap().rev;
        assert_eq!(window0_rev_after, window0_rev_after2);
    }
}
