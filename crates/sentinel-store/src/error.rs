// crates/sentinel-store/src/error.rs
//! The error kinds the engine surfaces (spec §7).
//!
//! `NotFound` and `Validation` are returned directly without logging;
//! `EngineFailure` carries the underlying driver error plus the operation
//! name so a caller that does log has something to log. No panic is used
//! for control flow anywhere in this crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("{0}")]
    Other(String),
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    /// A singular lookup or conditional write affected no rows.
    #[error("not found")]
    NotFound,

    /// An enumerated filter string (alert status, timeline severity) fell
    /// outside its allowed set.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A storage-admin resource name fell outside its enumerated set.
    #[error("invalid storage resource: {0}")]
    InvalidStorageResource(String),

    /// A required field was missing or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The underlying storage engine failed; `op` names the operation for
    /// whoever decides to log it.
    #[error("{op}: {source}")]
    EngineFailure {
        op: &'static str,
        #[source]
        source: EngineError,
    },

    /// The caller's context ended before the operation completed.
    #[error("operation cancelled")]
    Cancelled,
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    pub fn engine(op: &'static str, source: sqlx::Error) -> Self {
        DbError::EngineFailure {
            op,
            source: EngineError::Sqlx(source),
        }
    }

    pub fn engine_msg(op: &'static str, message: impl Into<String>) -> Self {
        DbError::EngineFailure {
            op,
            source: EngineError::Other(message.into()),
        }
    }
}

/// Adds operation context to a raw driver result, matching the
/// `EngineFailure { op, source }` shape every call site is expected to
/// produce (spec §7: "engine failures are returned with added context").
pub trait ResultExt<T> {
    fn ctx(self, op: &'static str) -> DbResult<T>;
}

impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn ctx(self, op: &'static str) -> DbResult<T> {
        self.map_err(|e| DbError::engine(op, e))
    }
}
