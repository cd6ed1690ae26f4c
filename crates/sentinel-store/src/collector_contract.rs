// crates/sentinel-store/src/collector_contract.rs
//! The watchtower collector contract (spec §6): the shapes and pure
//! classification helpers the collector (an external process that reads
//! the live multiplexer and calls into this store once per tick) relies on.
//! The store does not run the collector itself — that, and the
//! HTTP/WebSocket fan-out that consumes `PublishPayload`, are out of scope
//! here (spec §1) — but the contract between them is part of this crate's
//! surface.

use serde::Serialize;

use crate::watchtower::patches::{InspectorPatch, SessionActivityPatch};

const ERROR_MARKERS: &[&str] =
    &["panic", "fatal", "segmentation fault", "traceback", "exception", "xdebug", "permission denied", "error", "failed"];
const WARN_MARKERS: &[&str] = &["warning", "warn", "deprecated", "timeout", "retry", "slow"];

/// Commands treated as "no command running" for `command.started`/
/// `command.finished` transitions.
const SHELL_LIKE_COMMANDS: &[&str] = &["", "sh", "bash", "zsh", "fish", "tmux", "-"];

/// Classifies a captured pane preview against the known severity markers,
/// error taking precedence over warn. Matching is case-insensitive
/// substring search.
pub fn classify_marker_severity(preview: &str) -> Option<&'static str> {
    let lowered = preview.to_ascii_lowercase();
    if ERROR_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Some("error");
    }
    if WARN_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Some("warn");
    }
    None
}

/// Whether `command` should be ignored for `command.started`/
/// `command.finished` transitions.
pub fn is_shell_like(command: &str) -> bool {
    SHELL_LIKE_COMMANDS.contains(&command)
}

/// The last non-blank line of `preview`, truncated to at most 240 chars,
/// used as the `output.marker` event summary.
pub fn marker_summary(preview: &str) -> String {
    let last_line = preview.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
    if last_line.chars().count() <= 240 {
        last_line.to_string()
    } else {
        last_line.chars().take(240).collect()
    }
}

/// Runtime metrics the collector records once per tick (spec §6.1 step 10).
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CollectTickMetrics {
    pub collect_total: u64,
    pub collect_errors_total: u64,
    pub last_collect_at: String,
    pub last_collect_duration_ms: i64,
    pub last_collect_sessions: i64,
    pub last_collect_changed_sessions: i64,
    pub last_collect_error: String,
}

pub const EVENT_SESSIONS_UPDATED: &str = "tmux.sessions.updated";
pub const EVENT_ACTIVITY_UPDATED: &str = "tmux.activity.updated";
pub const EVENT_TIMELINE_UPDATED: &str = "tmux.timeline.updated";

/// Payloads published to the push layer on changed sessions (spec §6.2).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PublishPayload {
    #[serde(rename = "tmux.sessions.updated")]
    SessionsUpdated {
        action: String,
        sessions: Vec<String>,
        global_rev: i64,
        session_patches: Vec<SessionActivityPatch>,
        inspector_patches: Vec<InspectorPatch>,
    },
    #[serde(rename = "tmux.activity.updated")]
    ActivityUpdated {
        global_rev: i64,
        sessions: Vec<String>,
        session_patches: Vec<SessionActivityPatch>,
        inspector_patches: Vec<InspectorPatch>,
    },
    #[serde(rename = "tmux.timeline.updated")]
    TimelineUpdated { sessions: Vec<String> },
}
