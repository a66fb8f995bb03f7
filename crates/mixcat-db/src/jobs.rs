//! Job queue repository implementation.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tracing::warn;
use uuid::Uuid;

use mixcat_core::{
    defaults, new_v7, Error, Job, JobRepository, JobStatus, QueueStats, Result, WorkerType,
};

/// PostgreSQL implementation of JobRepository.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Convert WorkerType to string for database.
    fn worker_type_to_str(worker_type: WorkerType) -> &'static str {
        match worker_type {
            WorkerType::FetchAndStage => "fetch_and_stage",
            WorkerType::Canonicalize => "canonicalize",
        }
    }

    /// Convert string from database to WorkerType.
    fn str_to_worker_type(s: &str) -> WorkerType {
        match s {
            "fetch_and_stage" => WorkerType::FetchAndStage,
            "canonicalize" => WorkerType::Canonicalize,
            _ => WorkerType::Canonicalize, // fallback
        }
    }

    /// Convert string from database to JobStatus.
    fn str_to_job_status(s: &str) -> JobStatus {
        match s {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending, // fallback
        }
    }

    /// Exponential retry backoff: base 5 minutes doubled per attempt.
    fn backoff(attempts: i32) -> Duration {
        let exp = attempts.clamp(0, 16) as u32;
        Duration::seconds(defaults::JOB_RETRY_BASE_SECS.saturating_mul(1i64 << exp))
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Job {
        Job {
            id: row.get("id"),
            worker_type: Self::str_to_worker_type(row.get("worker_type")),
            staged_id: row.get("staged_id"),
            payload: row.get("payload"),
            status: Self::str_to_job_status(row.get("status")),
            attempts: row.get("attempts"),
            max_attempts: row.get("max_attempts"),
            error_message: row.get("error_message"),
            last_run_at: row.get("last_run_at"),
            next_run_at: row.get("next_run_at"),
            created_at: row.get("created_at"),
            completed_at: row.get("completed_at"),
        }
    }
}

const JOB_COLUMNS: &str = "id, worker_type, staged_id, payload, status, attempts, max_attempts, \
                           error_message, last_run_at, next_run_at, created_at, completed_at";

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn queue(
        &self,
        worker_type: WorkerType,
        staged_id: Option<Uuid>,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let job_id = new_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO job_queue (id, worker_type, staged_id, payload, status, max_attempts, next_run_at, created_at)
             VALUES ($1, $2, $3, $4, 'pending', $5, $6, $6)",
        )
        .bind(job_id)
        .bind(Self::worker_type_to_str(worker_type))
        .bind(staged_id)
        .bind(&payload)
        .bind(defaults::JOB_MAX_ATTEMPTS)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(job_id)
    }

    async fn queue_deduplicated(
        &self,
        worker_type: WorkerType,
        staged_id: Option<Uuid>,
        payload: Option<JsonValue>,
    ) -> Result<Option<Uuid>> {
        // Atomic check-and-insert using INSERT ... WHERE NOT EXISTS to prevent
        // TOCTOU races when concurrent callers queue work for the same staged
        // record. Without a staged_id there is nothing to deduplicate on.
        let Some(sid) = staged_id else {
            return Ok(Some(self.queue(worker_type, None, payload).await?));
        };

        let job_id = new_v7();
        let now = Utc::now();
        let worker_type_str = Self::worker_type_to_str(worker_type);

        let result = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO job_queue (id, worker_type, staged_id, payload, status, max_attempts, next_run_at, created_at)
             SELECT $1, $2, $3, $4, 'pending', $5, $6, $6
             WHERE NOT EXISTS (
                 SELECT 1 FROM job_queue
                 WHERE staged_id = $3 AND worker_type = $2
                   AND status IN ('pending', 'running')
             )
             RETURNING id",
        )
        .bind(job_id)
        .bind(worker_type_str)
        .bind(sid)
        .bind(&payload)
        .bind(defaults::JOB_MAX_ATTEMPTS)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result)
    }

    async fn lease_next(&self) -> Result<Option<Job>> {
        self.lease_next_for_types(&[]).await
    }

    async fn lease_next_for_types(&self, worker_types: &[WorkerType]) -> Result<Option<Job>> {
        let now = Utc::now();
        let type_strings: Vec<String> = worker_types
            .iter()
            .map(|wt| Self::worker_type_to_str(*wt).to_string())
            .collect();

        // FOR UPDATE SKIP LOCKED makes the pending→running transition
        // invisible to concurrent lease attempts on the same row. Jobs are
        // leased FIFO by creation time; backoff gates via next_run_at.
        let query = format!(
            "UPDATE job_queue
             SET status = 'running', last_run_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'
                   AND next_run_at <= $1
                   AND (cardinality($2::text[]) = 0 OR worker_type = ANY($2))
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(now)
            .bind(&type_strings)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn release(&self, job_id: Uuid) -> Result<()> {
        // Shutdown revert: back to pending, immediately leasable, attempt
        // count untouched.
        sqlx::query(
            "UPDATE job_queue
             SET status = 'pending', next_run_at = $1
             WHERE id = $2 AND status = 'running'",
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET status = 'completed', completed_at = $1, error_message = NULL
             WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (attempts, max_attempts): (i32, i32) =
            sqlx::query_as("SELECT attempts, max_attempts FROM job_queue WHERE id = $1")
                .bind(job_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;

        let attempts = attempts + 1;

        if attempts < max_attempts {
            // Retry: reset to pending with exponential backoff.
            let next_run = now + Self::backoff(attempts);
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'pending', attempts = $1, error_message = $2, next_run_at = $3
                 WHERE id = $4",
            )
            .bind(attempts)
            .bind(error)
            .bind(next_run)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        } else {
            // Attempts exhausted: fail permanently.
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'failed', attempts = $1, completed_at = $2, error_message = $3
                 WHERE id = $4",
            )
            .bind(attempts)
            .bind(now)
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            warn!(
                subsystem = "db",
                component = "jobs",
                op = "fail",
                job_id = %job_id,
                attempts,
                error,
                "Job failed permanently after exhausting attempts"
            );
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn fail_terminal(&self, job_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET status = 'failed', attempts = attempts + 1, completed_at = $1, error_message = $2
             WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'running') as running,
                COUNT(*) FILTER (WHERE status = 'completed' AND completed_at > NOW() - INTERVAL '1 hour') as completed_last_hour,
                COUNT(*) FILTER (WHERE status = 'failed' AND completed_at > NOW() - INTERVAL '1 hour') as failed_last_hour,
                COUNT(*) as total
             FROM job_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get::<i64, _>("pending"),
            running: row.get::<i64, _>("running"),
            completed_last_hour: row.get::<i64, _>("completed_last_hour"),
            failed_last_hour: row.get::<i64, _>("failed_last_hour"),
            total: row.get::<i64, _>("total"),
        })
    }
}
