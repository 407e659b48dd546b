//! Job infrastructure for deferred chat side effects.
//!
//! - [`QueueClient`] - producer API, serializes a [`JobCommand`] into a row
//! - [`JobStore`] - durable storage with atomic claims ([`PostgresJobStore`],
//!   [`InMemoryJobStore`])
//! - [`JobRegistry`] - maps a [`JobType`] to its handler
//! - [`WorkerPool`] / [`JobWorker`] - poll, execute, retry, dead-letter
//!
//! ```text
//! slash command ─► QueueClient.enqueue ─► jobs row (visible at run_at)
//!                                              │
//! WorkerPool ─► JobWorker.claim_next ◄─────────┘
//!                   │
//!                   ├─► JobRegistry.execute ─► domain handler ─► chat API
//!                   └─► complete | fail ─► retry with backoff | dead_jobs
//! ```
//!
//! Handlers live in their domains; this module only provides the machinery.

mod job;
mod job_store;
mod memory;
mod pool;
mod queue;
mod registry;
mod worker;

pub use job::{
    Backoff, DeadJob, ErrorKind, FailDecision, FailOutcome, Job, JobType, PayloadError,
    RetryPolicy,
};
pub(crate) use job::to_chrono;
pub use job_store::{JobStore, JobStoreConfig, PostgresJobStore};
pub use memory::{Clock, InMemoryJobStore};
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use queue::{JobCommand, QueueClient};
pub use registry::{ClaimLost, JobContext, JobRegistry, SharedJobRegistry, UnregisteredJobType};
pub use worker::{classify_error, JobWorker, JobWorkerConfig};
