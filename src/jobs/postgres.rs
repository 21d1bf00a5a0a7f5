use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{Job, JobError, JobQueue, NewJob};

const JOB_COLUMNS: &str = "id, name, args, run_at, status, attempts, max_attempts, \
     lease_expires_at, last_error, created_at, updated_at";

/// [`JobQueue`] backed by the `jobs` table.
///
/// Claiming uses `FOR UPDATE SKIP LOCKED`, so any number of runner processes
/// can share one database.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: NewJob) -> Result<i64, JobError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (name, args, run_at, max_attempts)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&job.name)
        .bind(&job.args)
        .bind(job.run_at)
        .bind(job.max_attempts)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<Job>, JobError> {
        let sql = format!(
            r#"
            WITH due AS (
                SELECT id
                FROM jobs
                WHERE (status = 'pending' AND run_at <= $1)
                   OR (status = 'running' AND lease_expires_at < $1)
                ORDER BY run_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running',
                attempts = attempts + 1,
                lease_expires_at = $3,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM due)
            RETURNING {JOB_COLUMNS}
            "#
        );

        let jobs = sqlx::query_as::<_, Job>(&sql)
            .bind(now)
            .bind(limit)
            .bind(lease_until)
            .fetch_all(&self.pool)
            .await?;

        Ok(jobs)
    }

    async fn mark_succeeded(&self, id: i64) -> Result<(), JobError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded',
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobError::NotFound(id));
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), JobError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = CASE WHEN $3::TIMESTAMPTZ IS NULL THEN 'dead'::job_status ELSE 'pending'::job_status END,
                run_at = COALESCE($3, run_at),
                last_error = $2,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(retry_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Job, JobError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");

        sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(JobError::NotFound(id))
    }
}
