//! In-process job store for tests and local runs without Postgres.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::job::{to_chrono, DeadJob, ErrorKind, FailDecision, FailOutcome, Job, JobType};
use super::job_store::{JobStore, JobStoreConfig};

/// Source of "now" for the store.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    dead: Vec<DeadJob>,
}

/// Mutex-guarded map of jobs with the same claim semantics as
/// [`PostgresJobStore`](super::PostgresJobStore).
pub struct InMemoryJobStore {
    state: Mutex<State>,
    config: JobStoreConfig,
    clock: Clock,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_config(JobStoreConfig::default())
    }

    pub fn with_config(config: JobStoreConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            config,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, e.g. with one driven by paused tokio time.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Number of jobs still pending (including claimed ones).
    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.lock()?.jobs.len())
    }

    /// Snapshot of every pending job.
    pub fn pending(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.lock()?.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| (a.run_at, a.id).cmp(&(b.run_at, b.id)));
        Ok(jobs)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("in-memory job store lock poisoned"))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(
        &self,
        job_type: JobType,
        payload: Vec<u8>,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<Uuid> {
        let now = self.now();
        let job = Job::builder()
            .job_type(job_type)
            .payload(payload)
            .run_at(run_at.unwrap_or(now))
            .created_at(now)
            .build();
        let id = job.id;

        self.lock()?.jobs.insert(id, job);
        Ok(id)
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        let now = self.now();
        let lease = to_chrono(self.config.lease);
        let mut state = self.lock()?;

        let next = state
            .jobs
            .values()
            .filter(|job| job.is_claimable_at(now))
            .min_by_key(|job| (job.run_at, job.id))
            .map(|job| job.id);

        let Some(id) = next else {
            return Ok(None);
        };

        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| anyhow!("job {} vanished during claim", id))?;
        job.lock_owner = Some(worker_id.to_string());
        job.locked_until = Some(now + lease);

        Ok(Some(job.clone()))
    }

    async fn complete(&self, job_id: Uuid, worker_id: &str) -> Result<bool> {
        let mut state = self.lock()?;
        if !owned_by(&state, job_id, worker_id) {
            return Ok(false);
        }
        state.jobs.remove(&job_id);
        Ok(true)
    }

    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FailOutcome> {
        let now = self.now();
        let mut state = self.lock()?;

        let Some(current) = state.jobs.get(&job_id).map(|job| job.error_count) else {
            return Ok(FailOutcome::Missing);
        };
        if !owned_by(&state, job_id, worker_id) {
            return Ok(FailOutcome::LostClaim);
        }

        match self.config.retry.decide(current, kind) {
            FailDecision::Retry { error_count, delay } => {
                let job = state
                    .jobs
                    .get_mut(&job_id)
                    .ok_or_else(|| anyhow!("job {} vanished during fail", job_id))?;
                job.error_count = error_count;
                job.last_error = Some(error.to_string());
                job.lock_owner = None;
                job.locked_until = None;
                job.run_at = now + to_chrono(delay);

                Ok(FailOutcome::Retrying {
                    error_count,
                    run_at: job.run_at,
                })
            }
            FailDecision::DeadLetter {
                error_count,
                reason,
            } => {
                let job = state
                    .jobs
                    .remove(&job_id)
                    .ok_or_else(|| anyhow!("job {} vanished during fail", job_id))?;
                state.dead.push(DeadJob {
                    id: job.id,
                    job_type: job.job_type,
                    payload: job.payload,
                    run_at: job.run_at,
                    error_count,
                    last_error: Some(error.to_string()),
                    created_at: job.created_at,
                    failed_at: now,
                    reason,
                });

                Ok(FailOutcome::DeadLettered { error_count })
            }
        }
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<bool> {
        let now = self.now();
        let lease = to_chrono(self.config.lease);
        let mut state = self.lock()?;

        match state.jobs.get_mut(&job_id) {
            Some(job) if job.lock_owner.as_deref() == Some(worker_id) => {
                job.locked_until = Some(now + lease);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save_payload(&self, job_id: Uuid, worker_id: &str, payload: Vec<u8>) -> Result<bool> {
        match self.lock()?.jobs.get_mut(&job_id) {
            Some(job) if job.lock_owner.as_deref() == Some(worker_id) => {
                job.payload = payload;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.lock()?.jobs.get(&job_id).cloned())
    }

    async fn dead_letters(&self, limit: i64) -> Result<Vec<DeadJob>> {
        let state = self.lock()?;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(state.dead.iter().rev().take(limit).cloned().collect())
    }
}

fn owned_by(state: &State, job_id: Uuid, worker_id: &str) -> bool {
    state
        .jobs
        .get(&job_id)
        .is_some_and(|job| job.lock_owner.as_deref() == Some(worker_id))
}
