//! Durable job storage.
//!
//! [`JobStore`] is the seam between the queue and its backing table.
//! [`PostgresJobStore`] is the production implementation; claims use
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never receive the same row.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use super::job::{DeadJob, ErrorKind, FailDecision, FailOutcome, Job, JobType, RetryPolicy};

const JOB_COLUMNS: &str = "id, job_type, payload, run_at, error_count, last_error, \
                           lock_owner, locked_until, created_at";

/// Settings shared by every store implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStoreConfig {
    /// How long a claim stays valid without a heartbeat.
    pub lease: Duration,
    pub retry: RetryPolicy,
}

impl Default for JobStoreConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Storage operations for the job queue.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job, visible from `run_at` (default: now).
    async fn enqueue(
        &self,
        job_type: JobType,
        payload: Vec<u8>,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<Uuid>;

    /// Atomically claim the claimable job with the lowest `(run_at, id)`.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>>;

    /// Delete a job after its handler succeeded. Only the current claim
    /// owner may complete; returns false if `worker_id` no longer holds it.
    async fn complete(&self, job_id: Uuid, worker_id: &str) -> Result<bool>;

    /// Record a failure, release the claim, and reschedule or quarantine.
    /// A worker that lost its claim gets [`FailOutcome::LostClaim`].
    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FailOutcome>;

    /// Extend the claim held by `worker_id`. Returns false if the claim was lost.
    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<bool>;

    /// Overwrite the payload, used to persist handler progress. Returns false
    /// if `worker_id` no longer holds the claim.
    async fn save_payload(&self, job_id: Uuid, worker_id: &str, payload: Vec<u8>) -> Result<bool>;

    /// Look up a pending job.
    async fn find(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Most recently quarantined jobs first.
    async fn dead_letters(&self, limit: i64) -> Result<Vec<DeadJob>>;
}

/// PostgreSQL-backed job store.
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
    config: JobStoreConfig,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_config(pool, JobStoreConfig::default())
    }

    pub fn with_config(pool: PgPool, config: JobStoreConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn lease_ms(&self) -> String {
        self.config.lease.as_millis().to_string()
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn enqueue(
        &self,
        job_type: JobType,
        payload: Vec<u8>,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<Uuid> {
        let job = Job::builder().job_type(job_type).payload(payload).build();

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO jobs (id, job_type, payload, run_at, error_count, created_at)
            VALUES ($1, $2, $3, COALESCE($4, NOW()), 0, NOW())
            RETURNING id
            "#,
        )
        .bind(job.id)
        .bind(job.job_type)
        .bind(&job.payload)
        .bind(run_at)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to enqueue {} job", job_type))?;

        debug!(job_id = %id, job_type = %job_type, run_at = ?run_at, "job enqueued");
        Ok(id)
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        let query = format!(
            r#"
            WITH next_job AS (
                SELECT id
                FROM jobs
                WHERE run_at <= NOW()
                  AND (lock_owner IS NULL OR locked_until < NOW())
                ORDER BY run_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET lock_owner = $1,
                locked_until = NOW() + ($2 || ' milliseconds')::INTERVAL
            FROM next_job
            WHERE jobs.id = next_job.id
            RETURNING {}
            "#,
            qualified_columns("jobs")
        );

        let job = sqlx::query_as::<_, Job>(&query)
            .bind(worker_id)
            .bind(self.lease_ms())
            .fetch_optional(&self.pool)
            .await
            .context("failed to claim job")?;

        Ok(job)
    }

    async fn complete(&self, job_id: Uuid, worker_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND lock_owner = $2")
            .bind(job_id)
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to complete job {}", job_id))?;

        if result.rows_affected() == 0 {
            warn!(job_id = %job_id, worker_id = %worker_id, "completed job is gone or owned by another worker");
            return Ok(false);
        }
        Ok(true)
    }

    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FailOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (i32, Option<String>)>(
            "SELECT error_count, lock_owner FROM jobs WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("failed to load job {}", job_id))?;

        let error_count = match row {
            None => {
                tx.rollback().await?;
                return Ok(FailOutcome::Missing);
            }
            Some((_, owner)) if owner.as_deref() != Some(worker_id) => {
                tx.rollback().await?;
                return Ok(FailOutcome::LostClaim);
            }
            Some((error_count, _)) => error_count,
        };

        let outcome = match self.config.retry.decide(error_count, kind) {
            FailDecision::Retry { error_count, delay } => {
                let run_at = sqlx::query_scalar::<_, DateTime<Utc>>(
                    r#"
                    UPDATE jobs
                    SET error_count = $2,
                        last_error = $3,
                        lock_owner = NULL,
                        locked_until = NULL,
                        run_at = NOW() + ($4 || ' milliseconds')::INTERVAL
                    WHERE id = $1 AND lock_owner = $5
                    RETURNING run_at
                    "#,
                )
                .bind(job_id)
                .bind(error_count)
                .bind(error)
                .bind(delay.as_millis().to_string())
                .bind(worker_id)
                .fetch_one(&mut *tx)
                .await
                .with_context(|| format!("failed to reschedule job {}", job_id))?;

                FailOutcome::Retrying {
                    error_count,
                    run_at,
                }
            }
            FailDecision::DeadLetter {
                error_count,
                reason,
            } => {
                sqlx::query(
                    r#"
                    INSERT INTO dead_jobs (
                        id, job_type, payload, run_at, error_count, last_error,
                        created_at, failed_at, reason
                    )
                    SELECT id, job_type, payload, run_at, $2, $3, created_at, NOW(), $4
                    FROM jobs
                    WHERE id = $1 AND lock_owner = $5
                    "#,
                )
                .bind(job_id)
                .bind(error_count)
                .bind(error)
                .bind(&reason)
                .bind(worker_id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to quarantine job {}", job_id))?;

                sqlx::query("DELETE FROM jobs WHERE id = $1 AND lock_owner = $2")
                    .bind(job_id)
                    .bind(worker_id)
                    .execute(&mut *tx)
                    .await?;

                FailOutcome::DeadLettered { error_count }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET locked_until = NOW() + ($1 || ' milliseconds')::INTERVAL
            WHERE id = $2 AND lock_owner = $3
            "#,
        )
        .bind(self.lease_ms())
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to extend lease for job {}", job_id))?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_payload(&self, job_id: Uuid, worker_id: &str, payload: Vec<u8>) -> Result<bool> {
        let result = sqlx::query("UPDATE jobs SET payload = $2 WHERE id = $1 AND lock_owner = $3")
            .bind(job_id)
            .bind(payload)
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to save progress for job {}", job_id))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<Job>> {
        let query = format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS);
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(job)
    }

    async fn dead_letters(&self, limit: i64) -> Result<Vec<DeadJob>> {
        let jobs = sqlx::query_as::<_, DeadJob>(
            r#"
            SELECT id, job_type, payload, run_at, error_count, last_error,
                   created_at, failed_at, reason
            FROM dead_jobs
            ORDER BY failed_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }
}

fn qualified_columns(table: &str) -> String {
    JOB_COLUMNS
        .split(',')
        .map(|column| format!("{}.{}", table, column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returning_columns_are_table_qualified() {
        let columns = qualified_columns("jobs");
        assert!(columns.starts_with("jobs.id, jobs.job_type"));
        assert!(columns.ends_with("jobs.created_at"));
    }

    #[test]
    fn default_lease_is_one_minute() {
        assert_eq!(JobStoreConfig::default().lease, Duration::from_secs(60));
    }
}
