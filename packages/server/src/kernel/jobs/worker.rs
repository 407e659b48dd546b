//! Job worker loop.
//!
//! A `JobWorker` repeatedly:
//! - claims the next ready job from the [`JobStore`]
//! - runs its handler through the [`JobRegistry`] while a heartbeat task
//!   keeps the claim alive
//! - completes the job, or fails it with a classified [`ErrorKind`]
//!
//! ```text
//! JobWorker
//!     │
//!     ├─► claim_next (FOR UPDATE SKIP LOCKED)
//!     ├─► JobRegistry.execute(job, ctx)  ◄── heartbeat every N seconds
//!     └─► complete | fail(kind)
//! ```
//!
//! Shutdown is observed between jobs only; a running handler always finishes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use slack::SlackError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::{ErrorKind, FailOutcome, Job, PayloadError};
use super::job_store::JobStore;
use super::registry::{JobContext, JobRegistry, UnregisteredJobType};
use crate::kernel::ServerDeps;

#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    pub worker_id: String,
    /// Sleep between polls when no job is ready
    pub poll_interval: Duration,
    /// How often to extend the lease of a running job
    pub heartbeat_interval: Duration,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(20),
        }
    }
}

impl JobWorkerConfig {
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// Decide whether a handler error is worth retrying.
///
/// Permanent Slack errors, undecodable payloads and unknown job types are
/// non-retryable; everything else (transport, rate limits, database) retries.
pub fn classify_error(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(slack) = cause.downcast_ref::<SlackError>() {
            return if slack.is_permanent() {
                ErrorKind::NonRetryable
            } else {
                ErrorKind::Retryable
            };
        }
        if cause.is::<PayloadError>() || cause.is::<UnregisteredJobType>() {
            return ErrorKind::NonRetryable;
        }
    }
    ErrorKind::Retryable
}

pub struct JobWorker {
    store: Arc<dyn JobStore>,
    registry: Arc<JobRegistry>,
    deps: Arc<ServerDeps>,
    config: JobWorkerConfig,
}

impl JobWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<JobRegistry>,
        deps: Arc<ServerDeps>,
        config: JobWorkerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            deps,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(worker_id = %self.config.worker_id, "job worker starting");

        while !shutdown.is_cancelled() {
            let processed = match self.run_once().await {
                Ok(processed) => processed,
                Err(e) => {
                    error!(worker_id = %self.config.worker_id, error = %e, "failed to claim job");
                    false
                }
            };

            if !processed {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "job worker stopped");
    }

    /// Claim and process at most one job. Returns whether a job was found.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(job) = self.store.claim_next(&self.config.worker_id).await? else {
            return Ok(false);
        };

        self.process_job(job).await;
        Ok(true)
    }

    async fn process_job(&self, job: Job) {
        let job_id = job.id;
        let job_type = job.job_type;
        debug!(
            job_id = %job_id,
            job_type = %job_type,
            attempt = job.error_count + 1,
            worker_id = %self.config.worker_id,
            "job claimed"
        );

        match self.execute_with_heartbeat(&job).await {
            Ok(()) => {
                info!(job_id = %job_id, job_type = %job_type, "job succeeded");
                match self.store.complete(job_id, &self.config.worker_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(job_id = %job_id, "job finished after losing its claim");
                    }
                    Err(e) => {
                        error!(job_id = %job_id, error = %e, "failed to mark job as succeeded");
                    }
                }
            }
            Err(e) => {
                let kind = classify_error(&e);
                let message = format!("{:#}", e);
                match self
                    .store
                    .fail(job_id, &self.config.worker_id, &message, kind)
                    .await
                {
                    Ok(FailOutcome::Retrying {
                        error_count,
                        run_at,
                    }) => {
                        warn!(
                            job_id = %job_id,
                            job_type = %job_type,
                            error_count,
                            retry_at = %run_at,
                            error = %message,
                            "job failed, will retry"
                        );
                    }
                    Ok(FailOutcome::DeadLettered { error_count }) => {
                        error!(
                            job_id = %job_id,
                            job_type = %job_type,
                            error_count,
                            kind = ?kind,
                            error = %message,
                            "job moved to dead letter queue"
                        );
                    }
                    Ok(FailOutcome::Missing) => {
                        warn!(job_id = %job_id, error = %message, "failed job no longer exists");
                    }
                    Ok(FailOutcome::LostClaim) => {
                        warn!(
                            job_id = %job_id,
                            error = %message,
                            "failed job is now claimed by another worker, leaving it alone"
                        );
                    }
                    Err(store_err) => {
                        error!(job_id = %job_id, error = %store_err, "failed to mark job as failed");
                    }
                }
            }
        }
    }

    async fn execute_with_heartbeat(&self, job: &Job) -> Result<()> {
        let job_id = job.id;
        let store = self.store.clone();
        let worker_id = self.config.worker_id.clone();
        let heartbeat_interval = self.config.heartbeat_interval;

        let cancel = CancellationToken::new();
        let heartbeat_cancel = cancel.clone();
        let heartbeat_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            interval.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = heartbeat_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        match store.heartbeat(job_id, &worker_id).await {
                            Ok(true) => {}
                            Ok(false) => warn!(job_id = %job_id, "lost claim on running job"),
                            Err(e) => warn!(job_id = %job_id, error = %e, "heartbeat failed"),
                        }
                    }
                }
            }
        });

        let ctx = JobContext::new(
            job_id,
            self.config.worker_id.clone(),
            self.deps.clone(),
            self.store.clone(),
        );
        let result = self.registry.execute(job, ctx).await;

        cancel.cancel();
        let _ = heartbeat_handle.await;

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    use anyhow::anyhow;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::kernel::jobs::{InMemoryJobStore, JobCommand, JobType};
    use crate::kernel::TestDependencies;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Flaky {
        permanent: bool,
    }

    impl JobCommand for Flaky {
        const JOB_TYPE: JobType = JobType::DelayedDelete;
    }

    fn worker(store: Arc<InMemoryJobStore>, registry: JobRegistry) -> JobWorker {
        JobWorker::new(
            store,
            Arc::new(registry),
            TestDependencies::new().into_deps(),
            JobWorkerConfig::with_worker_id("test-worker"),
        )
    }

    #[test]
    fn config_defaults() {
        let config = JobWorkerConfig::default();
        assert!(config.worker_id.starts_with("worker-"));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn classify_permanent_slack_error() {
        let err = anyhow::Error::new(SlackError::api("channel_not_found"))
            .context("failed to delete message");
        assert_eq!(classify_error(&err), ErrorKind::NonRetryable);
    }

    #[test]
    fn classify_rate_limit_as_retryable() {
        let err = anyhow::Error::new(SlackError::RateLimited {
            retry_after: Some(3),
        });
        assert_eq!(classify_error(&err), ErrorKind::Retryable);
    }

    #[test]
    fn classify_unknown_errors_as_retryable() {
        assert_eq!(classify_error(&anyhow!("connection reset")), ErrorKind::Retryable);
    }

    #[test]
    fn classify_unregistered_type_as_permanent() {
        let err = anyhow::Error::new(UnregisteredJobType(JobType::CleanChannel));
        assert_eq!(classify_error(&err), ErrorKind::NonRetryable);
    }

    #[tokio::test]
    async fn run_once_on_empty_store_finds_nothing() {
        let store = Arc::new(InMemoryJobStore::new());
        let worker = worker(store, JobRegistry::new());
        assert!(!worker.run_once().await.unwrap());
    }

    #[tokio::test]
    async fn successful_job_is_removed() {
        let store = Arc::new(InMemoryJobStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = JobRegistry::new();
        let counter = calls.clone();
        registry.register::<Flaky, _, _>(move |_cmd, _ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let id = store
            .enqueue(JobType::DelayedDelete, br#"{"permanent":false}"#.to_vec(), None)
            .await
            .unwrap();

        let worker = worker(store.clone(), registry);
        assert!(worker.run_once().await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.find(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failures_are_retried_or_dead_lettered_by_kind() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut registry = JobRegistry::new();
        registry.register::<Flaky, _, _>(|cmd, _ctx| async move {
            if cmd.permanent {
                Err(SlackError::api("invalid_auth").into())
            } else {
                Err(anyhow!("temporary outage"))
            }
        });

        let transient = store
            .enqueue(JobType::DelayedDelete, br#"{"permanent":false}"#.to_vec(), None)
            .await
            .unwrap();
        let permanent = store
            .enqueue(JobType::DelayedDelete, br#"{"permanent":true}"#.to_vec(), None)
            .await
            .unwrap();

        let worker = worker(store.clone(), registry);
        assert!(worker.run_once().await.unwrap());
        assert!(worker.run_once().await.unwrap());

        let retried = store.find(transient).await.unwrap().unwrap();
        assert_eq!(retried.error_count, 1);
        assert_eq!(retried.last_error.as_deref(), Some("temporary outage"));

        assert!(store.find(permanent).await.unwrap().is_none());
        let dead = store.dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, permanent);
    }

    #[tokio::test]
    async fn undecodable_payload_is_dead_lettered() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut registry = JobRegistry::new();
        registry.register::<Flaky, _, _>(|_cmd, _ctx| async move { Ok(()) });

        let id = store
            .enqueue(JobType::DelayedDelete, b"garbage".to_vec(), None)
            .await
            .unwrap();

        let worker = worker(store.clone(), registry);
        worker.run_once().await.unwrap();

        assert!(store.find(id).await.unwrap().is_none());
        assert_eq!(store.dead_letters(1).await.unwrap()[0].id, id);
    }

    #[tokio::test]
    async fn job_taken_over_mid_run_is_left_to_the_new_owner() {
        let start = chrono::Utc::now();
        let offset = Arc::new(AtomicI64::new(0));
        let clock_offset = offset.clone();
        let store = Arc::new(InMemoryJobStore::new().with_clock(Arc::new(move || {
            start + chrono::Duration::seconds(clock_offset.load(Ordering::SeqCst))
        })));

        // The handler stalls past its lease; another worker claims the job and
        // the handler then fails.
        let mut registry = JobRegistry::new();
        let takeover_store = store.clone();
        registry.register::<Flaky, _, _>(move |_cmd, _ctx| {
            let store = takeover_store.clone();
            let offset = offset.clone();
            async move {
                offset.fetch_add(61, Ordering::SeqCst);
                store.claim_next("other-worker").await?;
                Err(anyhow!("slack timed out"))
            }
        });

        let id = store
            .enqueue(JobType::DelayedDelete, br#"{"permanent":false}"#.to_vec(), None)
            .await
            .unwrap();

        let worker = worker(store.clone(), registry);
        assert!(worker.run_once().await.unwrap());

        let job = store.find(id).await.unwrap().unwrap();
        assert_eq!(job.lock_owner.as_deref(), Some("other-worker"));
        assert_eq!(job.error_count, 0);
        assert!(job.last_error.is_none());
        assert!(store.dead_letters(10).await.unwrap().is_empty());
    }
}
