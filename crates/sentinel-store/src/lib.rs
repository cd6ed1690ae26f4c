// crates/sentinel-store/src/lib.rs
//! Sentinel's storage layer: a single-writer, embedded relational store for
//! the watchtower projection, activity timeline, alerts, runbooks,
//! scheduler, guardrails, recovery, storage admin, and custom services (see
//! spec §1–§4).
#![allow(clippy::too_many_arguments)]

pub mod alerts;
pub mod collector_contract;
pub mod custom_services;
pub mod error;
pub mod guardrails;
mod migrations;
pub mod recovery;
pub mod runbooks;
pub mod scheduler;
pub mod sessions;
pub mod storage_admin;
pub mod timeline;
pub mod watchtower;

pub use error::{DbError, DbResult};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use error::ResultExt;

/// Single-process, single-writer embedded store (spec §5). Exactly one
/// connection is ever opened to the database file; every caller's read or
/// write is serialised through it, which is what lets the engine avoid a
/// whole class of `SQLITE_BUSY` errors at the cost of write throughput.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// Opens (or creates) the database file at `path` and runs migrations.
    pub async fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DbError::engine_msg("Database::open", format!("creating {}: {e}", parent.display()))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .ctx("Database::open")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = Self::connect(options).await?;
        let db = Self { pool, db_path: path.to_owned() };
        migrations::run_migrations(&db.pool).await?;

        info!(path = %path.display(), "sentinel store opened");
        Ok(db)
    }

    /// Opens the database at the default location
    /// (`sentinel_core::paths::db_path()`).
    pub async fn open_default() -> DbResult<Self> {
        let path = sentinel_core::paths::db_path()
            .ok_or_else(|| DbError::engine_msg("Database::open_default", "failed to determine cache directory"))?;
        Self::open(&path).await
    }

    /// Opens an in-memory database (tests only). Uses `shared_cache(true)` so
    /// the single pool connection and any diagnostic connections opened
    /// against the same URI would see the same data; in practice the pool
    /// itself is still capped at one connection, matching the single-writer
    /// discipline used for file-backed databases.
    pub async fn open_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .ctx("Database::open_in_memory")?
            .shared_cache(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = Self::connect(options).await?;
        let db = Self { pool, db_path: PathBuf::new() };
        migrations::run_migrations(&db.pool).await?;
        Ok(db)
    }

    async fn connect(options: SqliteConnectOptions) -> DbResult<SqlitePool> {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(options)
            .await
            .ctx("Database::connect")
    }

    /// The underlying connection pool (capped at one connection).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The path to the database file; empty for in-memory databases.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Shuts the handle down, releasing the single connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Runtime key-value get, used for the `global_rev` counter (spec §4.3)
    /// and available to any caller that wants a small durable setting.
    pub async fn get_runtime_value(&self, key: &str) -> DbResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM runtime_kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .ctx("Database::get_runtime_value")?;
        Ok(row.map(|(v,)| v))
    }

    /// Runtime key-value upsert.
    pub async fn set_runtime_value(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO runtime_kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .ctx("Database::set_runtime_value")?;
        Ok(())
    }

    /// The `global_rev` counter's current value, or 0 when absent or
    /// unparseable (spec §4.3).
    pub async fn watchtower_global_revision(&self) -> DbResult<i64> {
        Ok(self
            .get_runtime_value("global_rev")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_runs_migrations() {
        let db = Database::open_in_memory().await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn migrations_are_idempotent_on_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sentinel.db");

        let db = Database::open(&path).await.unwrap();
        db.set_runtime_value("global_rev", "5").await.unwrap();
        db.close().await;

        let db2 = Database::open(&path).await.unwrap();
        assert_eq!(db2.watchtower_global_revision().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn seed_data_is_present() {
        let db = Database::open_in_memory().await.unwrap();
        let rules = db.list_guardrail_rules().await.unwrap();
        assert_eq!(rules.len(), 2);
        let runbooks = db.list_runbooks().await.unwrap();
        assert_eq!(runbooks.len(), 3);
        assert_eq!(db.watchtower_global_revision().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_database_is_created_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("sentinel.db");
        let db = Database::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(db.db_path(), path);
    }
}
