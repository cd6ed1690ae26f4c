//! Pane tail normalization and the short content digest (spec §6 step 3, §9
//! "Preview hashing").
//!
//! The digest is chosen for compactness in row size, not cryptographic
//! strength — any collision-resistant short hash would do. BLAKE3 is already
//! on the dependency tree for content-hash staleness checks elsewhere in the
//! stack, so it is reused here rather than pulling in a second hash crate.

/// Trims the input, drops blank lines, and keeps only the last four
/// non-blank lines, joined with `\n`. This is the normalization the
/// collector applies to a captured pane tail before hashing/storing it.
pub fn normalize_preview(captured: &str) -> String {
    let lines: Vec<&str> = captured
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let keep_from = lines.len().saturating_sub(4);
    lines[keep_from..].join("\n")
}

/// An 8-byte BLAKE3 prefix, hex-encoded (16 hex chars). Empty input maps to
/// the empty string so the `tail_preview == "" <=> tail_hash == ""`
/// invariant (spec §8) holds without special-casing at call sites.
pub fn short_digest(preview: &str) -> String {
    if preview.is_empty() {
        return String::new();
    }
    let hash = blake3::hash(preview.as_bytes());
    hex::encode(&hash.as_bytes()[..8])
}
