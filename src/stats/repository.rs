use async_trait::async_trait;
use chrono::Utc;
use sqlx::{types::Json, PgPool};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::{models::UserStats, StatsError};

#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn get_stats(&self, user_id: &str) -> Result<Option<UserStats>, StatsError>;

    /// Stores `stats` under its user id, replacing any previous record
    async fn upsert_stats(&self, stats: &UserStats) -> Result<(), StatsError>;

    /// Up to `limit` records ordered by user id, starting after `after`
    async fn list_stats(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UserStats>, StatsError>;
}

#[derive(Debug, Default)]
pub struct InMemoryStatsRepository {
    records: Arc<RwLock<BTreeMap<String, UserStats>>>,
}

impl InMemoryStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StatsRepository for InMemoryStatsRepository {
    async fn get_stats(&self, user_id: &str) -> Result<Option<UserStats>, StatsError> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn upsert_stats(&self, stats: &UserStats) -> Result<(), StatsError> {
        self.records
            .write()
            .await
            .insert(stats.user_id.clone(), stats.clone());
        Ok(())
    }

    async fn list_stats(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UserStats>, StatsError> {
        let records = self.records.read().await;
        let lower = match after {
            Some(cursor) => Bound::Excluded(cursor.to_string()),
            None => Bound::Unbounded,
        };
        Ok(records
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, stats)| stats.clone())
            .collect())
    }
}

/// PostgreSQL implementation storing each record as JSONB in `user_stats`
pub struct PostgresStatsRepository {
    pool: PgPool,
}

impl PostgresStatsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(e: sqlx::Error) -> StatsError {
    warn!(error = %e, "User stats database operation failed");
    StatsError::Repository(e.to_string())
}

#[async_trait]
impl StatsRepository for PostgresStatsRepository {
    #[instrument(skip(self))]
    async fn get_stats(&self, user_id: &str) -> Result<Option<UserStats>, StatsError> {
        let row: Option<(Json<UserStats>,)> =
            sqlx::query_as("SELECT stats FROM user_stats WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(row.map(|(Json(stats),)| stats))
    }

    #[instrument(skip(self, stats), fields(user_id = %stats.user_id))]
    async fn upsert_stats(&self, stats: &UserStats) -> Result<(), StatsError> {
        sqlx::query(
            "INSERT INTO user_stats (user_id, stats, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET stats = EXCLUDED.stats, updated_at = EXCLUDED.updated_at",
        )
        .bind(&stats.user_id)
        .bind(Json(stats))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        debug!("User stats stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_stats(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UserStats>, StatsError> {
        let rows: Vec<(Json<UserStats>,)> = sqlx::query_as(
            "SELECT stats FROM user_stats WHERE ($1::TEXT IS NULL OR user_id > $1) ORDER BY user_id LIMIT $2",
        )
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(|(Json(stats),)| stats).collect())
    }
}
