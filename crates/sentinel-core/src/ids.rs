//! Random hex id generation for records the caller may leave unidentified
//! (runbook ids default to 32 hex chars, schedule ids to 20 — spec §4.6/§4.7).

use uuid::Uuid;

/// Returns a lowercase hex string `n_hex_chars` long, generated from one or
/// more v4 UUIDs concatenated as needed.
pub fn hex_id(n_hex_chars: usize) -> String {
    let mut out = String::with_capacity(n_hex_chars);
    while out.len() < n_hex_chars {
        out.push_str(&Uuid::new_v4().simple().to_string());
    }
    out.truncate(n_hex_chars);
    out
}

/// 32-hex id, the runbook default.
pub fn runbook_id() -> String {
    hex_id(32)
}

/// 20-hex id, the schedule default.
pub fn schedule_id() -> String {
    hex_id(20)
}
