use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::{
    errors::TaskError,
    scheduler::{EnqueueTransaction, TaskScheduler, TaskSource},
    task::{ScheduledTask, Task},
};

/// PostgreSQL transactional outbox for deferred tasks
///
/// A commit inserts every staged row inside one database transaction.
/// Claimed rows are leased rather than removed, so a worker that dies
/// mid-task lets the lease expire and the task is delivered again.
pub struct PostgresTaskQueue {
    pool: PgPool,
    lease: Duration,
}

impl PostgresTaskQueue {
    pub fn new(pool: PgPool, lease: Duration) -> Self {
        Self { pool, lease }
    }

    fn to_chrono(duration: Duration) -> Result<chrono::Duration, TaskError> {
        chrono::Duration::from_std(duration)
            .map_err(|e| TaskError::scheduling(format!("invalid delay: {}", e)))
    }

    /// Moves a row from `deferred_tasks` to `dead_tasks` in one transaction
    async fn bury(&self, id: Uuid, error: &str) -> Result<(), TaskError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query(
            "INSERT INTO dead_tasks (id, kind, payload, attempt, last_error) \
             SELECT id, kind, payload, attempt, $2 FROM deferred_tasks WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        sqlx::query("DELETE FROM deferred_tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> TaskError {
    warn!(error = %e, "Task queue database operation failed");
    TaskError::scheduling(e.to_string())
}

/// A leased `deferred_tasks` row before its payload is decoded
#[derive(Debug, FromRow)]
struct ClaimedRow {
    id: Uuid,
    kind: String,
    payload: serde_json::Value,
    run_at: DateTime<Utc>,
    attempt: i32,
}

impl ClaimedRow {
    fn decode(self) -> Result<ScheduledTask, TaskError> {
        Ok(ScheduledTask {
            id: self.id,
            task: serde_json::from_value::<Task>(self.payload)?,
            run_at: self.run_at,
            attempt: self.attempt.max(0) as u32,
        })
    }
}

/// Splits leased rows into runnable tasks and rows that no longer decode
///
/// Undecodable rows come back as `(id, error)` so they can be moved to the
/// dead-letter table instead of blocking the head of the queue.
fn decode_claimed(rows: Vec<ClaimedRow>) -> (Vec<ScheduledTask>, Vec<(Uuid, String)>) {
    let mut claimed = Vec::with_capacity(rows.len());
    let mut undecodable = Vec::new();
    for row in rows {
        let (id, kind) = (row.id, row.kind.clone());
        match row.decode() {
            Ok(task) => claimed.push(task),
            Err(e) => {
                warn!(task_id = %id, task_kind = %kind, error = %e, "Claimed task payload does not decode");
                undecodable.push((id, e.to_string()));
            }
        }
    }
    claimed.sort_by_key(|t| t.run_at);
    (claimed, undecodable)
}

#[async_trait]
impl TaskScheduler for PostgresTaskQueue {
    #[instrument(skip(self, transaction), fields(staged = transaction.len()))]
    async fn commit(&self, transaction: EnqueueTransaction) -> Result<(), TaskError> {
        if transaction.is_empty() {
            return Ok(());
        }
        let scheduled = transaction.into_scheduled(Utc::now())?;

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for task in &scheduled {
            let payload = serde_json::to_value(&task.task)?;
            sqlx::query(
                "INSERT INTO deferred_tasks (id, kind, payload, run_at, attempt) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(task.id)
            .bind(task.task.kind().to_string())
            .bind(payload)
            .bind(task.run_at)
            .bind(task.attempt as i32)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;

        debug!(count = scheduled.len(), "Tasks committed to outbox");
        Ok(())
    }
}

#[async_trait]
impl TaskSource for PostgresTaskQueue {
    async fn claim_due(&self, limit: usize) -> Result<Vec<ScheduledTask>, TaskError> {
        let now = Utc::now();
        let lease_until = now + Self::to_chrono(self.lease)?;

        let rows = sqlx::query_as::<_, ClaimedRow>(
            "UPDATE deferred_tasks SET locked_until = $1 \
             WHERE id IN ( \
                 SELECT id FROM deferred_tasks \
                 WHERE run_at <= $2 AND (locked_until IS NULL OR locked_until < $2) \
                 ORDER BY run_at \
                 LIMIT $3 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, kind, payload, run_at, attempt",
        )
        .bind(lease_until)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let (claimed, undecodable) = decode_claimed(rows);
        for (id, reason) in undecodable {
            // the lease expires and the row is retried on the next claim
            if let Err(e) = self.bury(id, &reason).await {
                error!(task_id = %id, error = %e, "Failed to move undecodable task to dead_tasks");
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, id: Uuid) -> Result<(), TaskError> {
        sqlx::query("DELETE FROM deferred_tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn retry(&self, task: ScheduledTask, delay: Duration, error: &str) -> Result<(), TaskError> {
        let run_at = Utc::now() + Self::to_chrono(delay)?;
        sqlx::query(
            "UPDATE deferred_tasks SET run_at = $2, attempt = attempt + 1, locked_until = NULL, last_error = $3 WHERE id = $1",
        )
        .bind(task.id)
        .bind(run_at)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn discard(&self, task: ScheduledTask, error: &str) -> Result<(), TaskError> {
        self.bury(task.id, error).await
    }
}
