//! Local field catalog storage over SQLite

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{CatalogMeta, FieldDefinition, FieldKind, META_ETAG, META_LAST_TIME};

const CREATE_FIELDS: &str = r#"
CREATE TABLE IF NOT EXISTS ga_fields (
    gaid TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    data_type TEXT NOT NULL,
    column_group TEXT NOT NULL,
    ui_name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    calculation TEXT
)
"#;

/// Same shape as ga_fields; imports stage here before the swap.
const CREATE_STAGING: &str = r#"
CREATE TABLE IF NOT EXISTS ga_fields_staging (
    gaid TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    data_type TEXT NOT NULL,
    column_group TEXT NOT NULL,
    ui_name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    calculation TEXT
)
"#;

const CREATE_META: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_meta (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

/// Database connection pool and catalog operations
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the catalog database and ensure its schema.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Database(format!("Invalid database URL: {e}")))?
            .create_if_missing(true);

        // Catalog writes are admin-triggered and low-volume; a single
        // connection keeps the staged swap serialized against readers.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect: {e}")))?;

        for statement in [CREATE_FIELDS, CREATE_STAGING, CREATE_META] {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!("Catalog database ready");
        Ok(Self { pool })
    }

    /// In-memory database for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Drop any leftovers from a previous interrupted import.
    pub async fn clear_staging(&self) -> Result<()> {
        sqlx::query("DELETE FROM ga_fields_staging")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Stage one normalized field. Each call is its own unit of work, so a
    /// failure partway through an import cannot corrupt earlier rows.
    pub async fn insert_staged_field(&self, field: &FieldDefinition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO ga_fields_staging
                (gaid, type, data_type, column_group, ui_name, description, calculation)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&field.id)
        .bind(kind_to_string(field.kind))
        .bind(&field.data_type)
        .bind(&field.group)
        .bind(&field.ui_name)
        .bind(&field.description)
        .bind(field.calculation.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically replace the live catalog with the staged rows.
    ///
    /// Readers see the previous catalog until the transaction commits;
    /// there is no intermediate empty state.
    pub async fn commit_catalog_swap(&self) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM ga_fields").execute(&mut *tx).await?;
        let inserted = sqlx::query("INSERT INTO ga_fields SELECT * FROM ga_fields_staging")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM ga_fields_staging")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(inserted as usize)
    }

    /// Load the full catalog ordered by field id.
    pub async fn fields(&self) -> Result<Vec<FieldDefinition>> {
        let rows = sqlx::query(
            r#"
            SELECT gaid, type, data_type, column_group, ui_name, description, calculation
            FROM ga_fields
            ORDER BY gaid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_field).collect())
    }

    /// Catalog keyed by field id, the shape query building consumes.
    pub async fn field_map(&self) -> Result<HashMap<String, FieldDefinition>> {
        Ok(self
            .fields()
            .await?
            .into_iter()
            .map(|field| (field.id.clone(), field))
            .collect())
    }

    pub async fn catalog_size(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM ga_fields")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn get_meta(&self, name: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM catalog_meta WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    pub async fn set_meta(&self, name: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO catalog_meta (name, value) VALUES (?1, ?2)
            ON CONFLICT(name) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Sync bookkeeping for the fields listing.
    pub async fn catalog_meta(&self) -> Result<CatalogMeta> {
        let etag = self.get_meta(META_ETAG).await?;
        let last_sync_time = self
            .get_meta(META_LAST_TIME)
            .await?
            .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Ok(CatalogMeta {
            etag,
            last_sync_time,
        })
    }
}

/// Convert FieldKind to its database string
fn kind_to_string(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Dimension => "dimension",
        FieldKind::Metric => "metric",
    }
}

fn row_to_field(row: SqliteRow) -> FieldDefinition {
    let kind: String = row.get("type");
    FieldDefinition {
        id: row.get("gaid"),
        kind: FieldKind::from_type(&kind),
        data_type: row.get("data_type"),
        group: row.get("column_group"),
        ui_name: row.get("ui_name"),
        description: row.get("description"),
        calculation: row.get("calculation"),
    }
}
