// crates/sentinel-core/src/error.rs
use thiserror::Error;

/// Errors surfaced by the crates that sit below the storage engine
/// (path resolution, id/digest helpers). The engine's own error kinds live
/// in `sentinel_store::DbError` and mirror the same shape.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to determine cache directory")]
    NoCacheDir,
}

pub type CoreResult<T> = Result<T, CoreError>;
