//! Job registry mapping job types to handlers.
//!
//! Each domain registers its handlers at startup. Workers resolve the
//! handler for a claimed job by its [`JobType`], decode the payload, and run
//! it with a [`JobContext`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use thiserror::Error;
use uuid::Uuid;

use super::job::{Job, JobType};
use super::job_store::JobStore;
use super::queue::JobCommand;
use crate::kernel::ServerDeps;

type BoxedHandler = Box<dyn Fn(Job, JobContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A claimed job whose type has no registered handler.
#[derive(Debug, Error)]
#[error("no handler registered for job type {0}")]
pub struct UnregisteredJobType(pub JobType);

/// The running job was claimed by another worker after its lease expired.
#[derive(Debug, Error)]
#[error("job {0} is now claimed by another worker")]
pub struct ClaimLost(pub Uuid);

/// Everything a handler gets besides its request.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub worker_id: String,
    pub deps: Arc<ServerDeps>,
    store: Arc<dyn JobStore>,
}

impl JobContext {
    pub fn new(
        job_id: Uuid,
        worker_id: impl Into<String>,
        deps: Arc<ServerDeps>,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            job_id,
            worker_id: worker_id.into(),
            deps,
            store,
        }
    }

    /// Persist updated request state so a retry resumes from here.
    ///
    /// Fails with [`ClaimLost`] once another worker owns the job, which stops
    /// the handler before it does more work.
    pub async fn checkpoint<C: JobCommand>(&self, command: &C) -> Result<()> {
        let payload = command.encode()?;
        if !self
            .store
            .save_payload(self.job_id, &self.worker_id, payload)
            .await?
        {
            return Err(ClaimLost(self.job_id).into());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<JobType, BoxedHandler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `C::JOB_TYPE`, replacing any previous one.
    pub fn register<C, F, Fut>(&mut self, handler: F)
    where
        C: JobCommand,
        F: Fn(C, JobContext) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let boxed: BoxedHandler = Box::new(move |job, ctx| {
            let handler = handler.clone();
            async move {
                let command = C::decode(&job)?;
                handler(command, ctx).await
            }
            .boxed()
        });

        self.handlers.insert(C::JOB_TYPE, boxed);
    }

    /// Decode and run a claimed job.
    pub async fn execute(&self, job: &Job, ctx: JobContext) -> Result<()> {
        let handler = self
            .handlers
            .get(&job.job_type)
            .ok_or(UnregisteredJobType(job.job_type))?;

        handler(job.clone(), ctx).await
    }

    pub fn is_registered(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        self.handlers.keys().copied().collect()
    }
}

pub type SharedJobRegistry = Arc<JobRegistry>;
