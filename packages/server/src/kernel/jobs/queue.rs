//! Producer side of the job queue.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;
use uuid::Uuid;

use super::job::{Job, JobType, PayloadError};
use super::job_store::JobStore;

/// A typed job request that can be stored as a payload.
///
/// Implementors bind a request type to its [`JobType`]; encoding is JSON.
pub trait JobCommand: Serialize + DeserializeOwned + Send + Sync + 'static {
    const JOB_TYPE: JobType;

    fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        serde_json::to_vec(self).map_err(|source| PayloadError::Encode {
            job_type: Self::JOB_TYPE,
            source,
        })
    }

    fn decode(job: &Job) -> Result<Self, PayloadError> {
        job.payload_as()
    }
}

/// Serializes commands and hands them to the store.
#[derive(Clone)]
pub struct QueueClient {
    store: Arc<dyn JobStore>,
}

impl QueueClient {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Enqueue `command` to run at `run_at` (or immediately).
    pub async fn enqueue<C: JobCommand>(
        &self,
        command: &C,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<Uuid> {
        let payload = command.encode()?;
        let job_id = self.store.enqueue(C::JOB_TYPE, payload, run_at).await?;

        info!(job_id = %job_id, job_type = %C::JOB_TYPE, run_at = ?run_at, "enqueued job");
        Ok(job_id)
    }
}
