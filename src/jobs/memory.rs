use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{Job, JobError, JobQueue, JobStatus, NewJob};

/// [`JobQueue`] kept in process memory. Jobs are lost on restart.
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<BTreeMap<i64, Job>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job ever enqueued, in id order.
    pub async fn snapshot(&self) -> Vec<Job> {
        self.jobs.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: NewJob) -> Result<i64, JobError> {
        let mut jobs = self.jobs.lock().await;
        let id = jobs.keys().next_back().map_or(1, |last| last + 1);
        let now = Utc::now();
        jobs.insert(
            id,
            Job {
                id,
                name: job.name,
                args: job.args,
                run_at: job.run_at,
                status: JobStatus::Pending,
                attempts: 0,
                max_attempts: job.max_attempts,
                lease_expires_at: None,
                last_error: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<Job>, JobError> {
        let mut jobs = self.jobs.lock().await;

        let mut due: Vec<&mut Job> = jobs
            .values_mut()
            .filter(|job| match job.status {
                JobStatus::Pending => job.run_at <= now,
                JobStatus::Running => job.lease_expires_at.is_some_and(|lease| lease < now),
                JobStatus::Succeeded | JobStatus::Dead => false,
            })
            .collect();
        due.sort_by_key(|job| (job.run_at, job.id));

        let claimed = due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|job| {
                job.status = JobStatus::Running;
                job.attempts += 1;
                job.lease_expires_at = Some(lease_until);
                job.updated_at = Utc::now();
                job.clone()
            })
            .collect();

        Ok(claimed)
    }

    async fn mark_succeeded(&self, id: i64) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;
        job.status = JobStatus::Succeeded;
        job.lease_expires_at = None;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;
        job.last_error = Some(error.to_string());
        job.lease_expires_at = None;
        job.updated_at = Utc::now();
        match retry_at {
            Some(at) => {
                job.status = JobStatus::Pending;
                job.run_at = at;
            }
            None => job.status = JobStatus::Dead,
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Job, JobError> {
        self.jobs
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound(id))
    }
}
