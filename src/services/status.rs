use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::status::{Stage, StatusRecord};

/// Durable id -> status mapping read by status queries and written by the
/// worker. `set` is atomic for a single key; readers racing a write observe
/// either the old or the new record, never a torn one.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<StatusRecord>, StatusStoreError>;
    async fn set(&self, record: &StatusRecord) -> Result<(), StatusStoreError>;
}

/// SQLite-backed status store. One row per job, overwritten at each
/// checkpoint via an upsert.
#[derive(Clone)]
pub struct SqliteStatusStore {
    pool: SqlitePool,
}

impl SqliteStatusStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusStore for SqliteStatusStore {
    async fn get(&self, id: Uuid) -> Result<Option<StatusRecord>, StatusStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, percentage, stage, content_address, updated_at
            FROM transcode_status
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => {
                let id_str: String = r.try_get("id")?;
                let stage_str: String = r.try_get("stage")?;
                let percentage: i64 = r.try_get("percentage")?;
                let updated_at: DateTime<Utc> = r.try_get("updated_at")?;

                Some(StatusRecord {
                    id: Uuid::parse_str(&id_str)
                        .map_err(|_| StatusStoreError::CorruptRecord(id_str))?,
                    percentage: percentage.clamp(0, 100) as u8,
                    stage: Stage::from_str(&stage_str)
                        .map_err(|_| StatusStoreError::CorruptRecord(stage_str))?,
                    content_address: r.try_get("content_address")?,
                    updated_at,
                })
            }
            None => None,
        })
    }

    async fn set(&self, record: &StatusRecord) -> Result<(), StatusStoreError> {
        sqlx::query(
            r#"
            INSERT INTO transcode_status (id, percentage, stage, content_address, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT(id) DO UPDATE SET
                percentage = excluded.percentage,
                stage = excluded.stage,
                content_address = excluded.content_address,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.percentage as i64)
        .bind(record.stage.to_string())
        .bind(record.content_address.as_deref())
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt status record: {0}")]
    CorruptRecord(String),
}
