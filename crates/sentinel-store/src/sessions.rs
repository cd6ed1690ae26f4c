// crates/sentinel-store/src/sessions.rs
//! Sessions registry: the authoritative list of multiplex session names plus
//! each session's monotonic window-naming sequence (spec §3 "Session", §4.2).

use sentinel_core::time::now_rfc3339;

use crate::error::{DbResult, ResultExt};
use crate::Database;

impl Database {
    /// Upserts a session's `hash`/`last_content`. `icon` is preserved across
    /// conflicts — this upsert never touches it.
    pub async fn upsert_session_registry(&self, name: &str, hash: &str, content: &str) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO sessions (name, hash, last_content, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                hash = excluded.hash,
                last_content = excluded.last_content,
                updated_at = excluded.updated_at",
        )
        .bind(name)
        .bind(hash)
        .bind(content)
        .bind(now_rfc3339())
        .execute(self.pool())
        .await
        .ctx("sessions::upsert")?;
        Ok(())
    }

    /// Renames a session in place. A missing `old` name is a no-op.
    pub async fn rename_session_registry(&self, old: &str, new: &str) -> DbResult<()> {
        sqlx::query("UPDATE sessions SET name = ?1, updated_at = ?2 WHERE name = ?3")
            .bind(new)
            .bind(now_rfc3339())
            .bind(old)
            .execute(self.pool())
            .await
            .ctx("sessions::rename")?;
        Ok(())
    }

    /// Sets a session's icon.
    pub async fn set_session_icon(&self, name: &str, icon: &str) -> DbResult<()> {
        sqlx::query("UPDATE sessions SET icon = ?1, updated_at = ?2 WHERE name = ?3")
            .bind(icon)
            .bind(now_rfc3339())
            .bind(name)
            .execute(self.pool())
            .await
            .ctx("sessions::set_icon")?;
        Ok(())
    }

    /// Allocates the next window-naming sequence number for `name`, clamped
    /// up to `min`. Persists `current + 1` and returns the value handed out.
    /// A session with no prior row starts from `min`.
    pub async fn allocate_next_window_sequence(&self, name: &str, min: i64) -> DbResult<i64> {
        let min = min.max(1);
        let mut tx = self.pool().begin().await.ctx("sessions::allocate_next_window_sequence::begin")?;

        let current: Option<(i64,)> = sqlx::query_as("SELECT next_window_seq FROM sessions WHERE name = ?1")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await
            .ctx("sessions::allocate_next_window_sequence::select")?;

        let allocated = current.map(|(seq,)| seq.max(min)).unwrap_or(min);

        sqlx::query(
            "INSERT INTO sessions (name, next_window_seq, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET next_window_seq = excluded.next_window_seq, updated_at = excluded.updated_at",
        )
        .bind(name)
        .bind(allocated + 1)
        .bind(now_rfc3339())
        .execute(&mut *tx)
        .await
        .ctx("sessions::allocate_next_window_sequence::upsert")?;

        tx.commit().await.ctx("sessions::allocate_next_window_sequence::commit")?;
        Ok(allocated)
    }

    /// Deletes every registry row whose name is not in `active`. An empty
    /// `active` set deletes everything.
    pub async fn purge_session_registry(&self, active: &[String]) -> DbResult<u64> {
        if active.is_empty() {
            let result = sqlx::query("DELETE FROM sessions")
                .execute(self.pool())
                .await
                .ctx("sessions::purge")?;
            return Ok(result.rows_affected());
        }

        let placeholders: Vec<String> = (1..=active.len()).map(|i| format!("?{i}")).collect();
        let sql = format!("DELETE FROM sessions WHERE name NOT IN ({})", placeholders.join(", "));
        let mut query = sqlx::query(&sql);
        for name in active {
            query = query.bind(name);
        }
        let result = query.execute(self.pool()).await.ctx("sessions::purge")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_creates_then_updates_preserving_icon() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert_session_registry("dev", "h1", "c1").await.unwrap();
        db.set_session_icon("dev", "🖥").await.unwrap();
        db.upsert_session_registry("dev", "h2", "c2").await.unwrap();

        let row: (String, String, String) =
            sqlx::query_as("SELECT hash, last_content, icon FROM sessions WHERE name = 'dev'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(row, ("h2".to_string(), "c2".to_string(), "🖥".to_string()));
    }

    #[tokio::test]
    async fn rename_is_noop_when_missing() {
        let db = Database::open_in_memory().await.unwrap();
        db.rename_session_registry("ghost", "dev").await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn allocate_next_window_sequence_clamps_and_increments() {
        let db = Database::open_in_memory().await.unwrap();
        assert_eq!(db.allocate_next_window_sequence("dev", 1).await.unwrap(), 1);
        assert_eq!(db.allocate_next_window_sequence("dev", 1).await.unwrap(), 2);
        // A higher minimum clamps the allocation up, never down.
        assert_eq!(db.allocate_next_window_sequence("dev", 10).await.unwrap(), 10);
        assert_eq!(db.allocate_next_window_sequence("dev", 1).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn purge_deletes_complement_of_active_set() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert_session_registry("a", "", "").await.unwrap();
        db.upsert_session_registry("b", "", "").await.unwrap();
        db.purge_session_registry(&["a".to_string()]).await.unwrap();

        let names: Vec<(String,)> = sqlx::query_as("SELECT name FROM sessions")
            .fetch_all(db.pool())
            .await
            .unwrap();
        assert_eq!(names, vec![("a".to_string(),)]);
    }

    #[tokio::test]
    async fn purge_with_empty_active_set_deletes_all() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert_session_registry("a", "", "").await.unwrap();
        db.purge_session_registry(&[]).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }
}
