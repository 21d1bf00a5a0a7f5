//! Polling job runner.
//!
//! Claims due jobs, dispatches them by name, and decides between success,
//! retry with exponential backoff, and dead-lettering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Job, JobError, JobQueue};
use crate::config::JobSettings;

/// Longest delay between two attempts of the same job.
const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// Why a handler gave up on a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// Retrying cannot help (missing rows, rejected content, bad payload).
    Permanent(String),
    /// Infrastructure trouble; worth another attempt.
    Transient(String),
}

impl JobFailure {
    pub fn message(&self) -> &str {
        match self {
            JobFailure::Permanent(msg) | JobFailure::Transient(msg) => msg,
        }
    }
}

/// A named unit of work.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, args: &serde_json::Value) -> Result<(), JobFailure>;
}

/// What happened to one claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Retrying,
    Dead,
}

pub struct JobRunner {
    queue: Arc<dyn JobQueue>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    settings: JobSettings,
}

impl JobRunner {
    pub fn new(queue: Arc<dyn JobQueue>, settings: JobSettings) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            settings,
        }
    }

    pub fn register(mut self, name: &str, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(name.to_string(), handler);
        self
    }

    /// Claims and processes every job due at `now`, one batch at a time.
    /// Returns how many jobs were processed.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<usize, JobError> {
        let lease = chrono::Duration::from_std(self.settings.lease)
            .unwrap_or_else(|_| chrono::Duration::minutes(1));
        let lease_until = now + lease;
        let mut processed = 0;

        loop {
            let jobs = self
                .queue
                .claim_due(now, self.settings.batch_size, lease_until)
                .await?;
            if jobs.is_empty() {
                break;
            }

            debug!(count = jobs.len(), "claimed jobs");
            for job in jobs {
                self.process(job, now).await?;
                processed += 1;
            }
        }

        Ok(processed)
    }

    /// Runs one claimed job and records the outcome.
    pub async fn process(&self, job: Job, now: DateTime<Utc>) -> Result<Outcome, JobError> {
        let Some(handler) = self.handlers.get(&job.name) else {
            error!(job_id = job.id, job_name = %job.name, "no handler registered");
            self.queue
                .mark_failed(job.id, &format!("unknown job: {}", job.name), None)
                .await?;
            return Ok(Outcome::Dead);
        };

        match handler.handle(&job.args).await {
            Ok(()) => {
                debug!(job_id = job.id, job_name = %job.name, "job succeeded");
                self.queue.mark_succeeded(job.id).await?;
                Ok(Outcome::Succeeded)
            }
            Err(JobFailure::Transient(msg)) if job.attempts < job.max_attempts => {
                let retry_at = now + self.backoff(job.attempts);
                warn!(
                    job_id = job.id,
                    job_name = %job.name,
                    attempt = job.attempts,
                    retry_at = %retry_at,
                    error = %msg,
                    "job failed, retrying"
                );
                self.queue.mark_failed(job.id, &msg, Some(retry_at)).await?;
                Ok(Outcome::Retrying)
            }
            Err(failure) => {
                error!(
                    job_id = job.id,
                    job_name = %job.name,
                    attempt = job.attempts,
                    error = %failure.message(),
                    "job dead-lettered"
                );
                self.queue.mark_failed(job.id, failure.message(), None).await?;
                Ok(Outcome::Dead)
            }
        }
    }

    /// `retry_base * 2^(attempt-1)`, capped at one hour.
    fn backoff(&self, attempt: i32) -> chrono::Duration {
        let exponent = attempt.saturating_sub(1).clamp(0, 20) as u32;
        let delay = self
            .settings
            .retry_base
            .saturating_mul(2u32.pow(exponent))
            .min(MAX_BACKOFF);
        chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1))
    }

    /// Polls until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            handlers = self.handlers.len(),
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "job runner starting"
        );

        loop {
            if let Err(e) = self.run_due(Utc::now()).await {
                error!(error = %e, "failed to process due jobs");
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        info!("job runner stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::jobs::{JobStatus, MemoryJobQueue, NewJob};

    struct Scripted {
        calls: AtomicUsize,
        failure: Option<JobFailure>,
    }

    impl Scripted {
        fn new(failure: Option<JobFailure>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failure,
            })
        }
    }

    #[async_trait]
    impl JobHandler for Scripted {
        async fn handle(&self, _args: &serde_json::Value) -> Result<(), JobFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.failure {
                Some(failure) => Err(failure.clone()),
                None => Ok(()),
            }
        }
    }

    fn settings() -> JobSettings {
        JobSettings {
            max_attempts: 3,
            retry_base: Duration::from_secs(2),
            ..JobSettings::default()
        }
    }

    async fn enqueue(queue: &MemoryJobQueue, name: &str, run_at: DateTime<Utc>) -> i64 {
        queue
            .enqueue(NewJob {
                name: name.into(),
                args: serde_json::json!({}),
                run_at,
                max_attempts: 3,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn due_jobs_succeed() {
        let queue = Arc::new(MemoryJobQueue::new());
        let handler = Scripted::new(None);
        let runner = JobRunner::new(queue.clone(), settings()).register("ok", handler.clone());
        let now = Utc::now();
        let id = enqueue(&queue, "ok", now).await;
        enqueue(&queue, "ok", now + chrono::Duration::minutes(10)).await;

        assert_eq!(runner.run_due(now).await.unwrap(), 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.get(id).await.unwrap().status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn transient_failures_back_off_then_die() {
        let queue = Arc::new(MemoryJobQueue::new());
        let handler = Scripted::new(Some(JobFailure::Transient("db down".into())));
        let runner = JobRunner::new(queue.clone(), settings()).register("flaky", handler.clone());
        let now = Utc::now();
        let id = enqueue(&queue, "flaky", now).await;

        runner.run_due(now).await.unwrap();
        let job = queue.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.run_at, now + chrono::Duration::seconds(2));

        let second = job.run_at;
        runner.run_due(second).await.unwrap();
        let job = queue.get(id).await.unwrap();
        assert_eq!(job.run_at, second + chrono::Duration::seconds(4));

        runner.run_due(job.run_at).await.unwrap();
        let job = queue.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Dead);
        assert_eq!(job.attempts, 3);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let queue = Arc::new(MemoryJobQueue::new());
        let handler = Scripted::new(Some(JobFailure::Permanent("comment gone".into())));
        let runner = JobRunner::new(queue.clone(), settings()).register("gone", handler.clone());
        let now = Utc::now();
        let id = enqueue(&queue, "gone", now).await;

        runner.run_due(now).await.unwrap();

        let job = queue.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Dead);
        assert_eq!(job.last_error.as_deref(), Some("comment gone"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_jobs_are_dead_lettered() {
        let queue = Arc::new(MemoryJobQueue::new());
        let runner = JobRunner::new(queue.clone(), settings());
        let now = Utc::now();
        let id = enqueue(&queue, "mystery", now).await;

        runner.run_due(now).await.unwrap();

        assert_eq!(queue.get(id).await.unwrap().status, JobStatus::Dead);
    }

    #[test]
    fn backoff_is_capped() {
        let runner = JobRunner::new(Arc::new(MemoryJobQueue::new()), settings());
        assert_eq!(runner.backoff(1), chrono::Duration::seconds(2));
        assert_eq!(runner.backoff(3), chrono::Duration::seconds(8));
        assert_eq!(runner.backoff(40), chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let queue = Arc::new(MemoryJobQueue::new());
        let runner = JobRunner::new(queue, settings());
        let token = CancellationToken::new();
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), runner.run(token))
            .await
            .expect("runner should stop promptly");
    }
}
