//! Centralized path functions for on-disk storage locations.
//!
//! Single source of truth — avoids ad-hoc `dirs::cache_dir().join(...)` calls
//! scattered across the store.

use std::path::PathBuf;

/// App cache root: `~/Library/Caches/sentinel/` (macOS) or `~/.cache/sentinel/` (Linux).
pub fn app_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("sentinel"))
}

/// SQLite database file: `<app_cache_dir>/sentinel.db`.
pub fn db_path() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("sentinel.db"))
}
