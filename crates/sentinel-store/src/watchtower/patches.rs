// crates/sentinel-store/src/watchtower/patches.rs
//! Pure patch builders (spec §4.3): compact payloads built from projection
//! rows, pushed to clients so they can reconcile their view without
//! refetching (spec GLOSSARY "Patch"). None of these functions touch the
//! database — callers fetch the rows and pass them in.

use serde::Serialize;

use super::{PaneRow, SessionRow, WindowRow};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionActivityPatch {
    pub name: String,
    pub attached: i64,
    pub windows: i64,
    pub panes: i64,
    pub activity_at: String,
    pub last_content: String,
    pub unread_windows: i64,
    pub unread_panes: i64,
    pub rev: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WindowPatch {
    pub session: String,
    pub index: i64,
    pub name: String,
    pub active: bool,
    pub panes: i64,
    pub layout: String,
    pub unread_panes: i64,
    pub has_unread: bool,
    pub rev: i64,
    pub activity_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PanePatch {
    pub session: String,
    pub window_index: i64,
    pub pane_index: i64,
    pub pane_id: String,
    pub title: String,
    pub active: bool,
    pub tty: String,
    pub current_path: String,
    pub start_command: String,
    pub current_command: String,
    pub tail_preview: String,
    pub revision: i64,
    pub seen_revision: i64,
    pub has_unread: bool,
    pub changed_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InspectorPatch {
    pub session: String,
    pub windows: Vec<WindowPatch>,
    pub panes: Vec<PanePatch>,
}

/// Builds the session activity patch. `last_content` comes from the
/// sessions registry row, which the watchtower projection does not itself
/// carry.
pub fn session_activity_patch(row: &SessionRow, last_content: &str) -> SessionActivityPatch {
    SessionActivityPatch {
        name: row.name.clone(),
        attached: row.attached,
        windows: row.windows,
        panes: row.panes,
        activity_at: row.activity_at.clone(),
        last_content: last_content.to_string(),
        unread_windows: row.unread_windows,
        unread_panes: row.unread_panes,
        rev: row.rev,
    }
}

/// Builds one window patch. `panes` is the set of panes belonging to this
/// window; its length becomes the patch's `panes` count.
pub fn window_patch(row: &WindowRow, panes: &[PaneRow]) -> WindowPatch {
    WindowPatch {
        session: row.session.clone(),
        index: row.window_index,
        name: row.name.clone(),
        active: row.active,
        panes: panes.len() as i64,
        layout: row.layout.clone(),
        unread_panes: row.unread_panes,
        has_unread: row.has_unread,
        rev: row.rev,
        activity_at: row.window_activity_at.clone(),
    }
}

/// Builds one pane patch.
pub fn pane_patch(row: &PaneRow) -> PanePatch {
    PanePatch {
        session: row.session.clone(),
        window_index: row.window_index,
        pane_index: row.pane_index,
        pane_id: row.pane_id.clone(),
        title: row.title.clone(),
        active: row.active,
        tty: row.tty.clone(),
        current_path: row.current_path.clone(),
        start_command: row.start_command.clone(),
        current_command: row.current_command.clone(),
        tail_preview: row.tail_preview.clone(),
        revision: row.revision,
        seen_revision: row.seen_revision,
        has_unread: row.revision > row.seen_revision,
        changed_at: row.changed_at.clone(),
    }
}

/// Builds the inspector patch for one session's windows and panes.
/// `session` falls back to the first window's, then the first pane's,
/// session when the caller leaves it empty.
pub fn inspector_patch(session: &str, windows: &[WindowRow], panes: &[PaneRow]) -> InspectorPatch {
    let resolved_session = if !session.is_empty() {
        session.to_string()
    } else if let Some(window) = windows.first() {
        window.session.clone()
    } else if let Some(pane) = panes.first() {
        pane.session.clone()
    } else {
        String::new()
    };

    let window_patches = windows
        .iter()
        .map(|w| {
            let window_panes: Vec<PaneRow> = panes.iter().filter(|p| p.window_index == w.window_index).cloned().collect();
            window_patch(w, &window_panes)
        })
        .collect();

    InspectorPatch {
        session: resolved_session,
        windows: window_patches,
        panes: panes.iter().map(pane_patch).collect(),
    }
}
