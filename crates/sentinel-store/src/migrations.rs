// crates/sentinel-store/src/migrations.rs
//! Ordered, versioned schema migrations (spec §4.1).
//!
//! Each entry is a `NNNNNN_name.sql` resource embedded at compile time.
//! `run_migrations` applies any version not yet recorded in
//! `schema_migrations`, each inside its own transaction, and records the
//! applied version in the same transaction so a crash between "run the SQL"
//! and "record the version" can never silently skip or double-apply a
//! migration.

use sentinel_core::time::now_rfc3339;
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult, ResultExt};

/// `(filename, contents)` pairs, ordered the way they appear here — which
/// must match ascending version order parsed from the filename.
const MIGRATIONS: &[(&str, &str)] = &[
    ("000001_sessions.sql", include_str!("../migrations/000001_sessions.sql")),
    ("000002_watchtower.sql", include_str!("../migrations/000002_watchtower.sql")),
    ("000003_timeline.sql", include_str!("../migrations/000003_timeline.sql")),
    ("000004_alerts.sql", include_str!("../migrations/000004_alerts.sql")),
    ("000005_runbooks.sql", include_str!("../migrations/000005_runbooks.sql")),
    ("000006_scheduler.sql", include_str!("../migrations/000006_scheduler.sql")),
    ("000007_guardrails.sql", include_str!("../migrations/000007_guardrails.sql")),
    ("000008_recovery.sql", include_str!("../migrations/000008_recovery.sql")),
    ("000009_custom_services.sql", include_str!("../migrations/000009_custom_services.sql")),
    ("000010_seed_data.sql", include_str!("../migrations/000010_seed_data.sql")),
];

struct ParsedMigration {
    version: i64,
    name: String,
    sql: &'static str,
}

/// Parses `NNNNNN_name.sql` into `(version, name)`. An unparseable filename
/// is fatal (spec §4.1): it means the embedded migration set itself is
/// broken, not something a caller can recover from.
fn parse_filename(filename: &str) -> DbResult<(i64, String)> {
    let stem = filename.strip_suffix(".sql").ok_or_else(|| {
        DbError::engine_msg(
            "migrations::parse_filename",
            format!("migration file {filename} is missing the .sql suffix"),
        )
    })?;
    let (version_str, name) = stem.split_once('_').ok_or_else(|| {
        DbError::engine_msg(
            "migrations::parse_filename",
            format!("migration file {filename} has no NNNNNN_ prefix"),
        )
    })?;
    let version: i64 = version_str.parse().map_err(|_| {
        DbError::engine_msg(
            "migrations::parse_filename",
            format!("migration file {filename} has a non-numeric version prefix"),
        )
    })?;
    Ok((version, name.to_string()))
}

fn parsed_migrations() -> DbResult<Vec<ParsedMigration>> {
    let mut out = Vec::with_capacity(MIGRATIONS.len());
    for (filename, sql) in MIGRATIONS {
        let (version, name) = parse_filename(filename)?;
        out.push(ParsedMigration { version, name, sql });
    }
    out.sort_by_key(|m| m.version);
    Ok(out)
}

/// Ensures `schema_migrations` exists, then applies every migration whose
/// version is not yet recorded, each in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .ctx("migrations::create_tracking_table")?;

    let migrations = parsed_migrations()?;

    for migration in migrations {
        let already_applied: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM schema_migrations WHERE version = ?1")
                .bind(migration.version)
                .fetch_optional(pool)
                .await
                .ctx("migrations::check_applied")?;
        if already_applied.is_some() {
            continue;
        }

        let mut tx = pool.begin().await.ctx("migrations::begin")?;

        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .ctx("migrations::apply")?;

        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)")
            .bind(migration.version)
            .bind(&migration.name)
            .bind(now_rfc3339())
            .execute(&mut *tx)
            .await
            .ctx("migrations::record_applied")?;

        tx.commit().await.ctx("migrations::commit")?;

        tracing::info!(version = migration.version, name = %migration.name, "applied migration");
    }

    Ok(())
}
