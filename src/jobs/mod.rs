//! Delayed background jobs.
//!
//! ```text
//! ContentService ──schedule──► DeferredReplyScheduler ──enqueue──► JobQueue
//!                                                                    │
//!             JobRunner ◄──claim_due(now)────────────────────────────┘
//!                 │
//!                 └─► JobHandler (by name) ─► mark_succeeded / mark_failed
//! ```
//!
//! Delivery is at-least-once: a job whose lease expires while running is
//! claimed again. Jobs carry no dedup key.

pub mod memory;
pub mod postgres;
pub mod runner;
pub mod scheduler;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub use memory::MemoryJobQueue;
pub use postgres::PgJobQueue;
pub use runner::{JobFailure, JobHandler, JobRunner};
pub use scheduler::DeferredReplyScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    /// Permanently failed; kept for inspection, never claimed again.
    Dead,
}

/// Represents the 'jobs' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,

    /// Stable name used to find the handler.
    pub name: String,

    /// Handler-specific JSON payload.
    pub args: serde_json::Value,

    /// Earliest moment the job may run.
    pub run_at: DateTime<Utc>,

    pub status: JobStatus,

    /// Number of times the job has been claimed.
    pub attempts: i32,
    pub max_attempts: i32,

    pub lease_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub args: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub max_attempts: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Storage for delayed jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Stores a pending job and returns its id.
    async fn enqueue(&self, job: NewJob) -> Result<i64, JobError>;

    /// Claims up to `limit` jobs that are due at `now`, plus running jobs
    /// whose lease expired. Claimed jobs become `running` until
    /// `lease_until` and have `attempts` incremented.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<Job>, JobError>;

    async fn mark_succeeded(&self, id: i64) -> Result<(), JobError>;

    /// Records `error`. With `retry_at` the job goes back to `pending` at that
    /// time, otherwise it is dead.
    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), JobError>;

    async fn get(&self, id: i64) -> Result<Job, JobError>;
}
