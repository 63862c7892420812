use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::Result;

/// Lifecycle of a video in the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Pending,
    Indexed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VideoRecord {
    pub id: i64,
    pub file_name: String,
    pub status: VideoStatus,
    pub total_chunks: i64,
    pub created_at: DateTime<Utc>,
}

/// Relational metadata collaborator. The core only needs a `file_name` to
/// locate media; the rest is bookkeeping for operators.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Register a video (or reset an existing record to pending). Returns its id.
    async fn upsert_video(&self, file_name: &str) -> Result<i64>;
    async fn mark_indexed(&self, file_name: &str, total_chunks: i64) -> Result<()>;
    async fn mark_failed(&self, file_name: &str) -> Result<()>;
    async fn get_video(&self, file_name: &str) -> Result<Option<VideoRecord>>;
    async fn list_videos(&self) -> Result<Vec<VideoRecord>>;
}

pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(sqlx::Error::from)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'pending',
                total_chunks INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        info!(url, "metadata store ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn upsert_video(&self, file_name: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO videos (file_name, status, total_chunks, created_at)
             VALUES (?1, 'pending', 0, ?2)
             ON CONFLICT(file_name)
             DO UPDATE SET status = 'pending', total_chunks = 0
             RETURNING id",
        )
        .bind(file_name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn mark_indexed(&self, file_name: &str, total_chunks: i64) -> Result<()> {
        sqlx::query("UPDATE videos SET status = 'indexed', total_chunks = ?1 WHERE file_name = ?2")
            .bind(total_chunks)
            .bind(file_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, file_name: &str) -> Result<()> {
        sqlx::query("UPDATE videos SET status = 'failed' WHERE file_name = ?1")
            .bind(file_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_video(&self, file_name: &str) -> Result<Option<VideoRecord>> {
        let record = sqlx::query_as::<_, VideoRecord>(
            "SELECT id, file_name, status, total_chunks, created_at
             FROM videos WHERE file_name = ?1",
        )
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        let records = sqlx::query_as::<_, VideoRecord>(
            "SELECT id, file_name, status, total_chunks, created_at
             FROM videos ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
