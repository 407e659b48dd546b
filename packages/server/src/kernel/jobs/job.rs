//! Job model for deferred chat side effects.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use typed_builder::TypedBuilder;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    DelayedDelete,
    CleanChannel,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::DelayedDelete => "delayed_delete",
            JobType::CleanChannel => "clean_channel",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient error - will retry if attempts remain
    #[default]
    Retryable,
    /// Permanent error - goes straight to the dead letter table
    NonRetryable,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

/// Payloads that cannot be encoded or decoded. Never retried.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to encode {job_type} payload: {source}")]
    Encode {
        job_type: JobType,
        source: serde_json::Error,
    },
    #[error("failed to decode {job_type} payload: {source}")]
    Decode {
        job_type: JobType,
        source: serde_json::Error,
    },
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,

    pub job_type: JobType,
    pub payload: Vec<u8>,

    // Scheduling
    #[builder(default = Utc::now())]
    pub run_at: DateTime<Utc>,

    // Error tracking
    #[builder(default = 0)]
    pub error_count: i32,
    #[builder(default, setter(strip_option))]
    pub last_error: Option<String>,

    // Claim
    #[builder(default, setter(strip_option))]
    pub lock_owner: Option<String>,
    #[builder(default, setter(strip_option))]
    pub locked_until: Option<DateTime<Utc>>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// A claim that has not yet expired at `now`.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.lock_owner.is_some() && self.locked_until.is_some_and(|until| until >= now)
    }

    /// `run_at <= now` and no live claim.
    pub fn is_claimable_at(&self, now: DateTime<Utc>) -> bool {
        self.run_at <= now && !self.is_locked_at(now)
    }

    /// Decode the payload into its request type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        serde_json::from_slice(&self.payload).map_err(|source| PayloadError::Decode {
            job_type: self.job_type,
            source,
        })
    }
}

/// A job moved out of `jobs` after a permanent failure or too many attempts.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct DeadJob {
    pub id: Uuid,
    pub job_type: JobType,
    pub payload: Vec<u8>,
    pub run_at: DateTime<Utc>,
    pub error_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
    pub reason: String,
}

// ============================================================================
// Retry policy
// ============================================================================

/// Exponential backoff: `base * 2^error_count`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(3600),
        }
    }
}

impl Backoff {
    pub fn delay(&self, error_count: i32) -> Duration {
        let exponent = error_count.clamp(0, 31) as u32;
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    /// Total executions allowed before the job is quarantined.
    pub max_attempts: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Decide what happens to a job that failed with `error_count` previous failures.
    pub fn decide(&self, error_count: i32, kind: ErrorKind) -> FailDecision {
        let error_count = error_count + 1;
        if !kind.should_retry() {
            return FailDecision::DeadLetter {
                error_count,
                reason: "non-retryable error".to_string(),
            };
        }
        if error_count >= self.max_attempts {
            return FailDecision::DeadLetter {
                error_count,
                reason: format!("gave up after {} attempts", error_count),
            };
        }
        FailDecision::Retry {
            error_count,
            delay: self.backoff.delay(error_count - 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailDecision {
    Retry { error_count: i32, delay: Duration },
    DeadLetter { error_count: i32, reason: String },
}

/// What `JobStore::fail` did with the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    Retrying {
        error_count: i32,
        run_at: DateTime<Utc>,
    },
    DeadLettered {
        error_count: i32,
    },
    /// The row was already gone (completed or dead-lettered elsewhere).
    Missing,
    /// Another worker holds the claim now; nothing was changed.
    LostClaim,
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}
