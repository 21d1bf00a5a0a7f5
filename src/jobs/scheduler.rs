use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobError, JobQueue, NewJob};

/// Name under which the auto-response worker is registered.
pub const AUTO_RESPONSE_JOB: &str = "blog.auto_response";

/// Payload of an auto-response job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoResponsePayload {
    pub comment_id: i64,
}

/// Enqueues "reply to comment X" jobs.
#[derive(Clone)]
pub struct DeferredReplyScheduler {
    queue: Arc<dyn JobQueue>,
    max_attempts: i32,
}

impl DeferredReplyScheduler {
    pub fn new(queue: Arc<dyn JobQueue>, max_attempts: i32) -> Self {
        Self {
            queue,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Schedules the auto-response for `comment_id` to run no earlier than
    /// `run_at`. Calling it twice schedules two jobs.
    pub async fn schedule(&self, comment_id: i64, run_at: DateTime<Utc>) -> Result<i64, JobError> {
        let args = serde_json::to_value(AutoResponsePayload { comment_id })?;
        let job_id = self
            .queue
            .enqueue(NewJob {
                name: AUTO_RESPONSE_JOB.to_string(),
                args,
                run_at,
                max_attempts: self.max_attempts,
            })
            .await?;

        tracing::info!(job_id, comment_id, run_at = %run_at, "auto-response scheduled");
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobStatus, MemoryJobQueue};

    #[tokio::test]
    async fn schedule_enqueues_named_job() {
        let queue = Arc::new(MemoryJobQueue::new());
        let scheduler = DeferredReplyScheduler::new(queue.clone(), 5);
        let run_at = Utc::now() + chrono::Duration::minutes(3);

        let id = scheduler.schedule(42, run_at).await.unwrap();

        let job = queue.get(id).await.unwrap();
        assert_eq!(job.name, AUTO_RESPONSE_JOB);
        assert_eq!(job.run_at, run_at);
        assert_eq!(job.max_attempts, 5);
        assert_eq!(job.status, JobStatus::Pending);
        let payload: AutoResponsePayload = serde_json::from_value(job.args).unwrap();
        assert_eq!(payload.comment_id, 42);
    }

    #[tokio::test]
    async fn scheduling_twice_creates_two_jobs() {
        let queue = Arc::new(MemoryJobQueue::new());
        let scheduler = DeferredReplyScheduler::new(queue.clone(), 3);
        let run_at = Utc::now();

        scheduler.schedule(7, run_at).await.unwrap();
        scheduler.schedule(7, run_at).await.unwrap();

        assert_eq!(queue.snapshot().await.len(), 2);
    }
}
