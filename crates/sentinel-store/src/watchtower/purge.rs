// crates/sentinel-store/src/watchtower/purge.rs
use crate::error::{DbResult, ResultExt};
use crate::Database;

fn in_placeholders(n: usize, start: usize) -> String {
    (start..start + n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

impl Database {
    /// Deletes watchtower session rows (and their windows/panes, by session
    /// name match) whose name is not in `active`.
    pub async fn purge_watchtower_sessions(&self, active: &[String]) -> DbResult<u64> {
        if active.is_empty() {
            let result = sqlx::query("DELETE FROM watchtower_sessions")
                .execute(self.pool())
                .await
                .ctx("watchtower::purge_sessions")?;
            return Ok(result.rows_affected());
        }
        let placeholders = in_placeholders(active.len(), 1);
        let sql = format!("DELETE FROM watchtower_sessions WHERE name NOT IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for name in active {
            query = query.bind(name);
        }
        let result = query.execute(self.pool()).await.ctx("watchtower::purge_sessions")?;
        Ok(result.rows_affected())
    }

    /// Deletes window rows for `session` whose index is not in
    /// `active_indices`.
    pub async fn purge_watchtower_windows(&self, session: &str, active_indices: &[i64]) -> DbResult<u64> {
        if active_indices.is_empty() {
            let result = sqlx::query("DELETE FROM watchtower_windows WHERE session = ?1")
                .bind(session)
                .execute(self.pool())
                .await
                .ctx("watchtower::purge_windows")?;
            return Ok(result.rows_affected());
        }
        let placeholders = in_placeholders(active_indices.len(), 2);
        let sql = format!("DELETE FROM watchtower_windows WHERE session = ?1 AND window_index NOT IN ({placeholders})");
        let mut query = sqlx::query(&sql).bind(session);
        for index in active_indices {
            query = query.bind(index);
        }
        let result = query.execute(self.pool()).await.ctx("watchtower::purge_windows")?;
        Ok(result.rows_affected())
    }

    /// Deletes pane rows for `session` whose `pane_id` is not in
    /// `active_pane_ids`.
    pub async fn purge_watchtower_panes(&self, session: &str, active_pane_ids: &[String]) -> DbResult<u64> {
        if active_pane_ids.is_empty() {
            let result = sqlx::query("DELETE FROM watchtower_panes WHERE session = ?1")
                .bind(session)
                .execute(self.pool())
                .await
                .ctx("watchtower::purge_panes")?;
            return Ok(result.rows_affected());
        }
        let placeholders = in_placeholders(active_pane_ids.len(), 2);
        let sql = format!("DELETE FROM watchtower_panes WHERE session = ?1 AND pane_id NOT IN ({placeholders})");
        let mut query = sqlx::query(&sql).bind(session);
        for pane_id in active_pane_ids {
            query = query.bind(pane_id);
        }
        let result = query.execute(self.pool()).await.ctx("watchtower::purge_panes")?;
        Ok(result.rows_affected())
    }

    /// Deletes presence rows whose `expires_at` is set and in the past
    /// relative to `now`.
    pub async fn prune_presence(&self, now: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM presence WHERE expires_at <> '' AND expires_at < ?1")
            .bind(now)
            .execute(self.pool())
            .await
            .ctx("watchtower::prune_presence")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchtower::{PaneWrite, PresenceWrite, WindowWrite};
    use crate::Database;

    #[tokio::test]
    async fn purge_panes_deletes_complement() {
        let db = Database::open_in_memory().await.unwrap();
        for id in ["%1", "%2", "%3"] {
            db.upsert_watchtower_pane(&PaneWrite {
                pane_id: id.into(),
                session: "dev".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        }
        let deleted = db
            .purge_watchtower_panes("dev", &["%1".to_string(), "%3".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        let remaining = db.list_watchtower_panes("dev").await.unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn purge_windows_scopes_to_session() {
        let db = Database::open_in_memory().await.unwrap();
        for (session, idx) in [("dev", 0), ("dev", 1), ("other", 0)] {
            db.upsert_watchtower_window(&WindowWrite {
                session: session.into(),
                window_index: idx,
                ..Default::default()
            })
            .await
            .unwrap();
        }
        db.purge_watchtower_windows("dev", &[0]).await.unwrap();
        assert_eq!(db.list_watchtower_windows("dev").await.unwrap().len(), 1);
        assert_eq!(db.list_watchtower_windows("other").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prune_presence_removes_expired_only() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert_presence(&PresenceWrite {
            terminal_id: "t1".into(),
            expires_at: "2000-01-01T00:00:00Z".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        db.upsert_presence(&PresenceWrite {
            terminal_id: "t2".into(),
            expires_at: "2999-01-01T00:00:00Z".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        db.upsert_presence(&PresenceWrite {
            terminal_id: "t3".into(),
            expires_at: "".into(),
            ..Default::default()
        })
        .await
        .unwrap();

        let removed = db.prune_presence("2026-01-01T00:00:00Z").await.unwrap();
        assert_eq!(removed, 1);
        let remaining: Vec<(String,)> = sqlx::query_as("SELECT terminal_id FROM presence ORDER BY terminal_id")
            .fetch_all(db.pool())
            .await
            .unwrap();
        assert_eq!(remaining, vec![("t2".to_string(),), ("t3".to_string(),)]);
    }
}
