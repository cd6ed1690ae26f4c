// crates/sentinel-store/src/watchtower/upserts.rs
use super::{PaneWrite, PresenceWrite, SessionWrite, WindowWrite};
use crate::error::{DbResult, ResultExt};
use crate::Database;

impl Database {
    /// Upserts a watchtower session row. `rev` is supplied by the caller;
    /// the store does not recompute it here (spec §4.3).
    pub async fn upsert_watchtower_session(&self, write: &SessionWrite) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO watchtower_sessions (
                name, attached, windows, panes, activity_at,
                last_preview, last_preview_at, last_preview_pane_id,
                unread_windows, unread_panes, rev, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(name) DO UPDATE SET
                attached = excluded.attached,
                windows = excluded.windows,
                panes = excluded.panes,
                activity_at = excluded.activity_at,
                last_preview = excluded.last_preview,
                last_preview_at = excluded.last_preview_at,
                last_preview_pane_id = excluded.last_preview_pane_id,
                unread_windows = excluded.unread_windows,
                unread_panes = excluded.unread_panes,
                rev = excluded.rev,
                updated_at = excluded.updated_at",
        )
        .bind(&write.name)
        .bind(write.attached)
        .bind(write.windows)
        .bind(write.panes)
        .bind(&write.activity_at)
        .bind(&write.last_preview)
        .bind(&write.last_preview_at)
        .bind(&write.last_preview_pane_id)
        .bind(write.unread_windows)
        .bind(write.unread_panes)
        .bind(write.rev)
        .bind(sentinel_core::time::now_rfc3339())
        .execute(self.pool())
        .await
        .ctx("watchtower::upsert_session")?;
        Ok(())
    }

    /// Upserts a watchtower window row, keyed by `(session, window_index)`.
    pub async fn upsert_watchtower_window(&self, write: &WindowWrite) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO watchtower_windows (
                session, window_index, name, active, layout,
                window_activity_at, unread_panes, has_unread, rev
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(session, window_index) DO UPDATE SET
                name = excluded.name,
                active = excluded.active,
                layout = excluded.layout,
                window_activity_at = excluded.window_activity_at,
                unread_panes = excluded.unread_panes,
                has_unread = excluded.has_unread,
                rev = excluded.rev",
        )
        .bind(&write.session)
        .bind(write.window_index)
        .bind(&write.name)
        .bind(write.active)
        .bind(&write.layout)
        .bind(&write.window_activity_at)
        .bind(write.unread_panes)
        .bind(write.has_unread)
        .bind(write.rev)
        .execute(self.pool())
        .await
        .ctx("watchtower::upsert_window")?;
        Ok(())
    }

    /// Upserts a watchtower pane row, keyed by `pane_id`. The caller's
    /// `tail_hash` is accepted verbatim alongside `tail_preview` — the
    /// pane-tail invariant (`tail_preview == "" <=> tail_hash == ""`) is the
    /// collector's responsibility to maintain (spec §4.3, §6 step 3).
    pub async fn upsert_watchtower_pane(&self, write: &PaneWrite) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO watchtower_panes (
                pane_id, session, window_index, pane_index, title, active, tty,
                current_path, start_command, current_command, tail_hash,
                tail_preview, tail_captured_at, revision, seen_revision, changed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(pane_id) DO UPDATE SET
                session = excluded.session,
                window_index = excluded.window_index,
                pane_index = excluded.pane_index,
                title = excluded.title,
                active = excluded.active,
                tty = excluded.tty,
                current_path = excluded.current_path,
                start_command = excluded.start_command,
                current_command = excluded.current_command,
                tail_hash = excluded.tail_hash,
                tail_preview = excluded.tail_preview,
                tail_captured_at = excluded.tail_captured_at,
                revision = excluded.revision,
                seen_revision = excluded.seen_revision,
                changed_at = excluded.changed_at",
        )
        .bind(&write.pane_id)
        .bind(&write.session)
        .bind(write.window_index)
        .bind(write.pane_index)
        .bind(&write.title)
        .bind(write.active)
        .bind(&write.tty)
        .bind(&write.current_path)
        .bind(&write.start_command)
        .bind(&write.current_command)
        .bind(&write.tail_hash)
        .bind(&write.tail_preview)
        .bind(&write.tail_captured_at)
        .bind(write.revision)
        .bind(write.seen_revision)
        .bind(&write.changed_at)
        .execute(self.pool())
        .await
        .ctx("watchtower::upsert_pane")?;
        Ok(())
    }

    /// Upserts a presence row, keyed by `terminal_id`.
    pub async fn upsert_presence(&self, write: &PresenceWrite) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO presence (
                terminal_id, session, window_index, pane_id, visible, focused, updated_at, expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(terminal_id) DO UPDATE SET
                session = excluded.session,
                window_index = excluded.window_index,
                pane_id = excluded.pane_id,
                visible = excluded.visible,
                focused = excluded.focused,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at",
        )
        .bind(&write.terminal_id)
        .bind(&write.session)
        .bind(write.window_index)
        .bind(&write.pane_id)
        .bind(write.visible)
        .bind(write.focused)
        .bind(&write.updated_at)
        .bind(&write.expires_at)
        .execute(self.pool())
        .await
        .ctx("watchtower::upsert_presence")?;
        Ok(())
    }

    /// Persists pane runtime state, resetting `started_at` whenever
    /// `current_command` changes (spec §3 "Pane runtime", §6 step 6).
    pub async fn upsert_pane_runtime(&self, pane_id: &str, current_command: &str) -> DbResult<()> {
        let now = sentinel_core::time::now_rfc3339();
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT current_command FROM pane_runtime WHERE pane_id = ?1")
                .bind(pane_id)
                .fetch_optional(self.pool())
                .await
                .ctx("watchtower::upsert_pane_runtime::select")?;

        let started_at = match &existing {
            Some((prev,)) if prev == current_command => None,
            _ => Some(now.clone()),
        };

        if let Some(started_at) = started_at {
            sqlx::query(
                "INSERT INTO pane_runtime (pane_id, current_command, started_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(pane_id) DO UPDATE SET
                    current_command = excluded.current_command,
                    started_at = excluded.started_at,
                    updated_at = excluded.updated_at",
            )
            .bind(pane_id)
            .bind(current_command)
            .bind(started_at)
            .bind(&now)
            .execute(self.pool())
            .await
            .ctx("watchtower::upsert_pane_runtime::reset")?;
        } else {
            sqlx::query("UPDATE pane_runtime SET updated_at = ?1 WHERE pane_id = ?2")
                .bind(&now)
                .bind(pane_id)
                .execute(self.pool())
                .await
                .ctx("watchtower::upsert_pane_runtime::touch")?;
        }

        Ok(())
    }
}
