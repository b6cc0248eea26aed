//! SQLite-backed guide index for local runs.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::ClinicalGuideRecord;
use crate::storage::GuideIndex;

/// `clinical_guides` table in a SQLite file (or memory).
#[derive(Clone)]
pub struct SqliteGuideIndex {
    pool: SqlitePool,
}

impl SqliteGuideIndex {
    /// Open (creating if needed) the database and the table.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let index = Self { pool };
        index.ensure_schema().await?;
        Ok(index)
    }

    /// Private in-memory database, one connection.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS clinical_guides (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                type TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                url TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_clinical_guides_name ON clinical_guides(name)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn record_from_row(row: &SqliteRow) -> Result<ClinicalGuideRecord> {
    let id: String = row.try_get("id")?;
    Ok(ClinicalGuideRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::validation(format!("invalid id '{id}': {e}")))?,
        name: row.try_get("name")?,
        guide_type: row.try_get("type")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        url: row.try_get("url")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl GuideIndex for SqliteGuideIndex {
    async fn contains(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT id FROM clinical_guides WHERE name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert(&self, record: &ClinicalGuideRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO clinical_guides (id, name, type, description, category, url, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.name)
        .bind(&record.guide_type)
        .bind(&record.description)
        .bind(&record.category)
        .bind(&record.url)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<ClinicalGuideRecord>> {
        let row = sqlx::query(
            "SELECT id, name, type, description, category, url, created_at
             FROM clinical_guides WHERE name = ? ORDER BY created_at LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        let names =
            sqlx::query_scalar::<_, String>("SELECT DISTINCT name FROM clinical_guides ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(names)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
