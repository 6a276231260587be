use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{entities::SourceList, repositories::errors::StoreError};

/// Harvest source configuration. The pipeline reads lists and records
/// scan bookkeeping; only administrators toggle `is_active`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListStore: Send + Sync {
    async fn active_lists(&self) -> Result<Vec<SourceList>, StoreError>;

    /// Returns false when the list does not exist.
    async fn set_active(&self, list_id: &str, active: bool) -> Result<bool, StoreError>;

    async fn mark_scanned(
        &self,
        list_id: &str,
        post_count: i32,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgListRepository {
    pool: PgPool,
}

impl PgListRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a list, or rename it if it already exists.
    pub async fn upsert(&self, list_id: &str, name: &str) -> Result<SourceList, StoreError> {
        let list = sqlx::query_as::<_, SourceList>(
            r#"
            INSERT INTO source_lists (list_id, name)
            VALUES ($1, $2)
            ON CONFLICT (list_id) DO UPDATE SET name = EXCLUDED.name
            RETURNING list_id, name, is_active, last_scanned_at, last_post_count, created_at
            "#,
        )
        .bind(list_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(list)
    }
}

#[async_trait]
impl ListStore for PgListRepository {
    async fn active_lists(&self) -> Result<Vec<SourceList>, StoreError> {
        let lists = sqlx::query_as::<_, SourceList>(
            r#"
            SELECT list_id, name, is_active, last_scanned_at, last_post_count, created_at
            FROM source_lists
            WHERE is_active
            ORDER BY created_at, list_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(lists)
    }

    async fn set_active(&self, list_id: &str, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE source_lists SET is_active = $2 WHERE list_id = $1")
            .bind(list_id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_scanned(
        &self,
        list_id: &str,
        post_count: i32,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE source_lists SET last_scanned_at = $2, last_post_count = $3 WHERE list_id = $1",
        )
        .bind(list_id)
        .bind(at)
        .bind(post_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
