// crates/sentinel-store/src/watchtower/mod.rs
//! The denormalised watchtower projection: sessions/windows/panes/presence,
//! per-entity `rev`, pane `revision`/`seen_revision`, the global change
//! journal, pane runtime, and the per-pane timeline (spec §3, §4.3).
//!
//! `rev`/`revision` fields on writes are supplied by the caller — the store
//! trusts the collector's incremental accounting and only ever recomputes
//! them itself inside the `mark_*_seen` transactions (spec §4.3 "Seen
//! semantics").

pub mod journal;
pub mod list;
pub mod patches;
pub mod purge;
pub mod seen;
pub mod upserts;

use serde::Serialize;
use sqlx::FromRow;

/// A write contract for `upsert_session`: everything the collector decided
/// this tick, including the `rev` it computed.
#[derive(Debug, Clone, Default)]
pub struct SessionWrite {
    pub name: String,
    pub attached: i64,
    pub windows: i64,
    pub panes: i64,
    pub activity_at: String,
    pub last_preview: String,
    pub last_preview_at: String,
    pub last_preview_pane_id: String,
    pub unread_windows: i64,
    pub unread_panes: i64,
    pub rev: i64,
}

#[derive(Debug, Clone, Default)]
pub struct WindowWrite {
    pub session: String,
    pub window_index: i64,
    pub name: String,
    pub active: bool,
    pub layout: String,
    pub window_activity_at: String,
    pub unread_panes: i64,
    pub has_unread: bool,
    pub rev: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PaneWrite {
    pub pane_id: String,
    pub session: String,
    pub window_index: i64,
    pub pane_index: i64,
    pub title: String,
    pub active: bool,
    pub tty: String,
    pub current_path: String,
    pub start_command: String,
    pub current_command: String,
    pub tail_hash: String,
    pub tail_preview: String,
    pub tail_captured_at: String,
    pub revision: i64,
    pub seen_revision: i64,
    pub changed_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct PresenceWrite {
    pub terminal_id: String,
    pub session: String,
    pub window_index: i64,
    pub pane_id: String,
    pub visible: bool,
    pub focused: bool,
    pub updated_at: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct SessionRow {
    pub name: String,
    pub attached: i64,
    pub windows: i64,
    pub panes: i64,
    pub activity_at: String,
    pub last_preview: String,
    pub last_preview_at: String,
    pub last_preview_pane_id: String,
    pub unread_windows: i64,
    pub unread_panes: i64,
    pub rev: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct WindowRow {
    pub session: String,
    pub window_index: i64,
    pub name: String,
    pub active: bool,
    pub layout: String,
    pub window_activity_at: String,
    pub unread_panes: i64,
    pub has_unread: bool,
    pub rev: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct PaneRow {
    pub pane_id: String,
    pub session: String,
    pub window_index: i64,
    pub pane_index: i64,
    pub title: String,
    pub active: bool,
    pub tty: String,
    pub current_path: String,
    pub start_command: String,
    pub current_command: String,
    pub tail_hash: String,
    pub tail_preview: String,
    pub tail_captured_at: String,
    pub revision: i64,
    pub seen_revision: i64,
    pub changed_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct PresenceRow {
    pub terminal_id: String,
    pub session: String,
    pub window_index: i64,
    pub pane_id: String,
    pub visible: bool,
    pub focused: bool,
    pub updated_at: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct PaneRuntimeRow {
    pub pane_id: String,
    pub current_command: String,
    pub started_at: String,
    pub updated_at: String,
}

/// A write contract for `insert_journal`; `changed_at` defaults to now when
/// left empty.
#[derive(Debug, Clone, Default)]
pub struct JournalWrite {
    pub global_rev: i64,
    pub entity_type: String,
    pub session: String,
    pub window_index: i64,
    pub pane_id: String,
    pub change_kind: String,
    pub changed_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct JournalEntry {
    pub id: i64,
    pub global_rev: i64,
    pub entity_type: String,
    pub session: String,
    pub window_index: i64,
    pub pane_id: String,
    pub change_kind: String,
    pub changed_at: String,
}
