// crates/sentinel-store/src/watchtower/list.rs
use super::{PaneRow, PaneRuntimeRow, PresenceRow, SessionRow, WindowRow};
use crate::error::{DbResult, ResultExt};
use crate::Database;

impl Database {
    /// All watchtower sessions, ordered by name.
    pub async fn list_watchtower_sessions(&self) -> DbResult<Vec<SessionRow>> {
        sqlx::query_as(
            "SELECT name, attached, windows, panes, activity_at, last_preview,
                    last_preview_at, last_preview_pane_id, unread_windows,
                    unread_panes, rev, updated_at
             FROM watchtower_sessions ORDER BY name ASC",
        )
        .fetch_all(self.pool())
        .await
        .ctx("watchtower::list_sessions")
    }

    pub async fn get_watchtower_session(&self, name: &str) -> DbResult<Option<SessionRow>> {
        sqlx::query_as(
            "SELECT name, attached, windows, panes, activity_at, last_preview,
                    last_preview_at, last_preview_pane_id, unread_windows,
                    unread_panes, rev, updated_at
             FROM watchtower_sessions WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .ctx("watchtower::get_session")
    }

    /// Windows for one session, ordered by `window_index`.
    pub async fn list_watchtower_windows(&self, session: &str) -> DbResult<Vec<WindowRow>> {
        sqlx::query_as(
            "SELECT session, window_index, name, active, layout, window_activity_at,
                    unread_panes, has_unread, rev
             FROM watchtower_windows WHERE session = ?1 ORDER BY window_index ASC",
        )
        .bind(session)
        .fetch_all(self.pool())
        .await
        .ctx("watchtower::list_windows")
    }

    /// Panes for one session, ordered by `(window_index, pane_index)`.
    pub async fn list_watchtower_panes(&self, session: &str) -> DbResult<Vec<PaneRow>> {
        sqlx::query_as(
            "SELECT pane_id, session, window_index, pane_index, title, active, tty,
                    current_path, start_command, current_command, tail_hash,
                    tail_preview, tail_captured_at, revision, seen_revision, changed_at
             FROM watchtower_panes WHERE session = ?1
             ORDER BY window_index ASC, pane_index ASC",
        )
        .bind(session)
        .fetch_all(self.pool())
        .await
        .ctx("watchtower::list_panes")
    }

    /// Panes within a single window, ordered by `pane_index`.
    pub async fn list_watchtower_window_panes(&self, session: &str, window_index: i64) -> DbResult<Vec<PaneRow>> {
        sqlx::query_as(
            "SELECT pane_id, session, window_index, pane_index, title, active, tty,
                    current_path, start_command, current_command, tail_hash,
                    tail_preview, tail_captured_at, revision, seen_revision, changed_at
             FROM watchtower_panes WHERE session = ?1 AND window_index = ?2
             ORDER BY pane_index ASC",
        )
        .bind(session)
        .bind(window_index)
        .fetch_all(self.pool())
        .await
        .ctx("watchtower::list_window_panes")
    }

    /// Presence rows for a session, ordered by `terminal_id`.
    pub async fn list_presence(&self, session: &str) -> DbResult<Vec<PresenceRow>> {
        sqlx::query_as(
            "SELECT terminal_id, session, window_index, pane_id, visible, focused, updated_at, expires_at
             FROM presence WHERE session = ?1 ORDER BY terminal_id ASC",
        )
        .bind(session)
        .fetch_all(self.pool())
        .await
        .ctx("watchtower::list_presence")
    }

    pub async fn get_pane_runtime(&self, pane_id: &str) -> DbResult<Option<PaneRuntimeRow>> {
        sqlx::query_as(
            "SELECT pane_id, current_command, started_at, updated_at FROM pane_runtime WHERE pane_id = ?1",
        )
        .bind(pane_id)
        .fetch_optional(self.pool())
        .await
        .ctx("watchtower::get_pane_runtime")
    }
}
