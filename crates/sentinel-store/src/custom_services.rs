// crates/sentinel-store/src/custom_services.rs
//! User-registered external service handles (spec §3/§4.11).

use serde::Serialize;
use sqlx::FromRow;

use sentinel_core::time::now_rfc3339;

use crate::error::{DbError, DbResult, ResultExt};
use crate::Database;

#[derive(Debug, Clone, Default)]
pub struct CustomServiceWrite {
    pub name: String,
    pub display_name: String,
    pub manager: String,
    pub scope: String,
    pub unit: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct CustomServiceRow {
    pub name: String,
    pub display_name: String,
    pub manager: String,
    pub scope: String,
    pub unit: String,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

const COLUMNS: &str = "name, display_name, manager, scope, unit, enabled, created_at, updated_at";

impl Database {
    /// Registers a new custom service. `name` and `unit` are required;
    /// duplicate `name` fails.
    pub async fn insert_custom_service(&self, write: &CustomServiceWrite) -> DbResult<CustomServiceRow> {
        if write.name.is_empty() || write.unit.is_empty() {
            return Err(DbError::Validation("name and unit are required".into()));
        }
        let existing: Option<(String,)> = sqlx::query_as("SELECT name FROM custom_services WHERE name = ?1")
            .bind(&write.name)
            .fetch_optional(self.pool())
            .await
            .ctx("custom_services::insert::check_duplicate")?;
        if existing.is_some() {
            return Err(DbError::Validation(format!("custom service {} already exists", write.name)));
        }
        let display_name = if write.display_name.is_empty() { write.name.clone() } else { write.display_name.clone() };
        let manager = if write.manager.is_empty() { "systemd".to_string() } else { write.manager.clone() };
        let scope = if write.scope.is_empty() { "user".to_string() } else { write.scope.clone() };
        let now = now_rfc3339();

        sqlx::query(
            "INSERT INTO custom_services (name, display_name, manager, scope, unit, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        )
        .bind(&write.name)
        .bind(&display_name)
        .bind(&manager)
        .bind(&scope)
        .bind(&write.unit)
        .bind(write.enabled)
        .bind(&now)
        .execute(self.pool())
        .await
        .ctx("custom_services::insert")?;

        sqlx::query_as(&format!("SELECT {COLUMNS} FROM custom_services WHERE name = ?1"))
            .bind(&write.name)
            .fetch_one(self.pool())
            .await
            .ctx("custom_services::insert::reload")
    }

    /// Enabled services, ordered by name.
    pub async fn list_custom_services(&self) -> DbResult<Vec<CustomServiceRow>> {
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM custom_services WHERE enabled = 1 ORDER BY name ASC"))
            .fetch_all(self.pool())
            .await
            .ctx("custom_services::list")
    }

    pub async fn delete_custom_service(&self, name: &str) -> DbResult<()> {
        if name.is_empty() {
            return Err(DbError::NotFound);
        }
        let result = sqlx::query("DELETE FROM custom_services WHERE name = ?1")
            .bind(name)
            .execute(self.pool())
            .await
            .ctx("custom_services::delete")?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
