//! Durable persistence for jobs and items.
//!
//! `claim_items` is the only operation that needs row-level locking: many
//! worker tasks pull from the same job concurrently, so it uses
//! `FOR UPDATE SKIP LOCKED` the same way the legacy job queue claimed rows.
//! Everything else is a plain read or a single-row update.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::common::error::TransferError;
use crate::kernel::jobs::item::{Item, ItemId, ItemPatch, ItemStatus};
use crate::kernel::jobs::job::{Job, JobId, JobStatus};

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn create_job(&self, job: &Job, items: &[Item]) -> Result<(), TransferError>;
    async fn get_job(&self, id: JobId) -> Result<Option<Job>, TransferError>;
    async fn list_jobs(&self, limit: i64, offset: i64) -> Result<Vec<Job>, TransferError>;
    async fn list_items(&self, job_id: JobId) -> Result<Vec<Item>, TransferError>;

    /// Atomically claim up to `limit` pending items from `job_id` for processing,
    /// transitioning them to `Downloading` so no other worker task picks them up.
    async fn claim_items(&self, job_id: JobId, limit: i64) -> Result<Vec<Item>, TransferError>;

    async fn update_item(&self, id: ItemId, patch: ItemPatch) -> Result<(), TransferError>;
    async fn increment_retry(&self, id: ItemId) -> Result<i32, TransferError>;

    async fn set_job_status(&self, id: JobId, status: JobStatus) -> Result<(), TransferError>;
    async fn mark_job_started(&self, id: JobId) -> Result<(), TransferError>;
    async fn mark_job_completed(&self, id: JobId, status: JobStatus) -> Result<(), TransferError>;
    async fn set_job_error(&self, id: JobId, message: &str) -> Result<(), TransferError>;

    /// Recompute `Job.{total,completed,success,skipped,failed}` from child items.
    async fn recompute_counts(&self, id: JobId) -> Result<Job, TransferError>;

    async fn cancel_job(&self, id: JobId) -> Result<(), TransferError>;
    async fn delete_job(&self, id: JobId) -> Result<(), TransferError>;
}

pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn create_job(&self, job: &Job, items: &[Item]) -> Result<(), TransferError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO transfer_jobs
                (id, status, start_date, end_date, sport_filter, settings_snapshot,
                 total, completed, success, skipped, failed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(job.id)
        .bind(job.status)
        .bind(job.start_date)
        .bind(job.end_date)
        .bind(&job.sport_filter)
        .bind(&job.settings_snapshot)
        .bind(job.total)
        .bind(job.completed)
        .bind(job.success)
        .bind(job.skipped)
        .bind(job.failed)
        .bind(job.created_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO transfer_items
                    (id, job_id, source_id, sport_code, activity_name, activity_time,
                     status, retry_count, metadata_status, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id)
            .bind(item.job_id)
            .bind(&item.source_id)
            .bind(item.sport_code)
            .bind(&item.activity_name)
            .bind(&item.activity_time)
            .bind(item.status)
            .bind(item.retry_count)
            .bind(item.metadata_status)
            .bind(item.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, TransferError> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM transfer_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn list_jobs(&self, limit: i64, offset: i64) -> Result<Vec<Job>, TransferError> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM transfer_jobs ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn list_items(&self, job_id: JobId) -> Result<Vec<Item>, TransferError> {
        let items = sqlx::query_as::<_, Item>(
            "SELECT * FROM transfer_items WHERE job_id = $1 ORDER BY updated_at ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn claim_items(&self, job_id: JobId, limit: i64) -> Result<Vec<Item>, TransferError> {
        let items = sqlx::query_as::<_, Item>(
            r#"
            WITH claimed AS (
                SELECT id FROM transfer_items
                WHERE job_id = $1 AND status = 'pending'
                ORDER BY updated_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE transfer_items
            SET status = 'downloading', updated_at = now()
            WHERE id IN (SELECT id FROM claimed)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn update_item(&self, id: ItemId, patch: ItemPatch) -> Result<(), TransferError> {
        let current = sqlx::query_as::<_, Item>("SELECT * FROM transfer_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| TransferError::NotFound(format!("item {id}")))?;

        let status = patch.status.unwrap_or(current.status);
        let error_message = patch.error_message.unwrap_or(current.error_message);
        let sink_id = patch.sink_id.unwrap_or(current.sink_id);
        let local_path = patch.local_path.unwrap_or(current.local_path);
        let metadata_status = patch.metadata_status.unwrap_or(current.metadata_status);
        let metadata_error = patch.metadata_error.unwrap_or(current.metadata_error);

        sqlx::query(
            r#"
            UPDATE transfer_items
            SET status = $2, error_message = $3, sink_id = $4, local_path = $5,
                metadata_status = $6, metadata_error = $7, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(&error_message)
        .bind(&sink_id)
        .bind(&local_path)
        .bind(metadata_status)
        .bind(&metadata_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_retry(&self, id: ItemId) -> Result<i32, TransferError> {
        let (retry_count,): (i32,) = sqlx::query_as(
            r#"
            UPDATE transfer_items
            SET retry_count = retry_count + 1, status = 'pending', updated_at = now()
            WHERE id = $1
            RETURNING retry_count
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(retry_count)
    }

    async fn set_job_status(&self, id: JobId, status: JobStatus) -> Result<(), TransferError> {
        sqlx::query("UPDATE transfer_jobs SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_job_started(&self, id: JobId) -> Result<(), TransferError> {
        sqlx::query(
            "UPDATE transfer_jobs SET status = 'running', started_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_job_completed(&self, id: JobId, status: JobStatus) -> Result<(), TransferError> {
        sqlx::query(
            "UPDATE transfer_jobs SET status = $2, completed_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_job_error(&self, id: JobId, message: &str) -> Result<(), TransferError> {
        sqlx::query("UPDATE transfer_jobs SET error_message = $2 WHERE id = $1")
            .bind(id)
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recompute_counts(&self, id: JobId) -> Result<Job, TransferError> {
        sqlx::query(
            r#"
            UPDATE transfer_jobs j
            SET total = sub.total,
                completed = sub.completed,
                success = sub.success,
                skipped = sub.skipped,
                failed = sub.failed
            FROM (
                SELECT
                    count(*) AS total,
                    count(*) FILTER (WHERE status IN ('success', 'skipped', 'failed')) AS completed,
                    count(*) FILTER (WHERE status = 'success') AS success,
                    count(*) FILTER (WHERE status = 'skipped') AS skipped,
                    count(*) FILTER (WHERE status = 'failed') AS failed
                FROM transfer_items
                WHERE job_id = $1
            ) sub
            WHERE j.id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_job(id)
            .await?
            .ok_or_else(|| TransferError::NotFound(format!("job {id}")))
    }

    async fn cancel_job(&self, id: JobId) -> Result<(), TransferError> {
        let job = self
            .get_job(id)
            .await?
            .ok_or_else(|| TransferError::NotFound(format!("job {id}")))?;
        if job.status.is_terminal() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE transfer_items
            SET status = 'failed', error_message = 'cancelled', updated_at = now()
            WHERE job_id = $1 AND status NOT IN ('success', 'skipped', 'failed')
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE transfer_jobs SET status = 'cancelled', completed_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.recompute_counts(id).await?;
        Ok(())
    }

    async fn delete_job(&self, id: JobId) -> Result<(), TransferError> {
        sqlx::query("DELETE FROM transfer_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
