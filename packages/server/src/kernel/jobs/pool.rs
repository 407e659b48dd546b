//! Fixed-size pool of [`JobWorker`]s sharing one store.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::job_store::JobStore;
use super::registry::JobRegistry;
use super::worker::{JobWorker, JobWorkerConfig};
use crate::kernel::ServerDeps;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub size: usize,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Upper bound on waiting for in-flight jobs at shutdown
    pub drain_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            size: 2,
            poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(20),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

pub struct WorkerPool {
    id: Uuid,
    store: Arc<dyn JobStore>,
    registry: Arc<JobRegistry>,
    deps: Arc<ServerDeps>,
    config: WorkerPoolConfig,
    shutdown: CancellationToken,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<JobRegistry>,
        deps: Arc<ServerDeps>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            store,
            registry,
            deps,
            config,
            shutdown: CancellationToken::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Token that stops the pool when cancelled; share it with signal handlers.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of worker tasks still running.
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Spawn `size` workers. Calling it again spawns another batch.
    pub fn start(&mut self) {
        info!(pool_id = %self.id, size = self.config.size, "starting worker pool");

        for index in 0..self.config.size {
            let config = JobWorkerConfig {
                worker_id: format!("worker-{}-{}", self.id, index),
                poll_interval: self.config.poll_interval,
                heartbeat_interval: self.config.heartbeat_interval,
            };
            let worker = JobWorker::new(
                self.store.clone(),
                self.registry.clone(),
                self.deps.clone(),
                config,
            );
            self.tasks.spawn(worker.run(self.shutdown.child_token()));
        }
    }

    /// Stop claiming and wait for in-flight jobs, up to the drain timeout.
    ///
    /// Returns `true` when every worker exited in time. Workers still running
    /// after the timeout are aborted; their jobs become claimable again once
    /// the lease expires.
    pub async fn shutdown(mut self) -> bool {
        info!(pool_id = %self.id, "stopping worker pool");
        self.shutdown.cancel();

        let drained = tokio::time::timeout(self.config.drain_timeout, async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(e) = result {
                    warn!(pool_id = %self.id, error = %e, "worker task ended abnormally");
                }
            }
        })
        .await
        .is_ok();

        if drained {
            info!(pool_id = %self.id, "worker pool drained");
        } else {
            warn!(
                pool_id = %self.id,
                remaining = self.tasks.len(),
                timeout_secs = self.config.drain_timeout.as_secs(),
                "drain timeout elapsed, aborting workers"
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }

        drained
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::kernel::jobs::{InMemoryJobStore, JobCommand, JobType};
    use crate::kernel::TestDependencies;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Sleep {
        millis: u64,
    }

    impl JobCommand for Sleep {
        const JOB_TYPE: JobType = JobType::CleanChannel;
    }

    fn pool(store: Arc<InMemoryJobStore>, done: Arc<AtomicUsize>, drain: Duration) -> WorkerPool {
        let mut registry = JobRegistry::new();
        registry.register::<Sleep, _, _>(move |cmd, _ctx| {
            let done = done.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(cmd.millis)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        WorkerPool::new(
            store,
            Arc::new(registry),
            TestDependencies::new().into_deps(),
            WorkerPoolConfig {
                size: 2,
                poll_interval: Duration::from_millis(50),
                heartbeat_interval: Duration::from_secs(5),
                drain_timeout: drain,
            },
        )
    }

    #[test]
    fn default_pool_has_two_workers() {
        assert_eq!(WorkerPoolConfig::default().size, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn start_spawns_configured_workers_and_shutdown_drains() {
        let store = Arc::new(InMemoryJobStore::new());
        let done = Arc::new(AtomicUsize::new(0));
        let mut pool = pool(store, done, Duration::from_secs(30));

        pool.start();
        assert_eq!(pool.running(), 2);
        assert!(pool.shutdown().await);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let done = Arc::new(AtomicUsize::new(0));
        store
            .enqueue(JobType::CleanChannel, br#"{"millis":2000}"#.to_vec(), None)
            .await
            .unwrap();

        let mut pool = pool(store.clone(), done.clone(), Duration::from_secs(30));
        pool.start();

        // Let a worker claim the job and start sleeping.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(pool.shutdown().await);

        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_gives_up_after_drain_timeout() {
        let store = Arc::new(InMemoryJobStore::new());
        let done = Arc::new(AtomicUsize::new(0));
        store
            .enqueue(JobType::CleanChannel, br#"{"millis":60000}"#.to_vec(), None)
            .await
            .unwrap();

        let mut pool = pool(store.clone(), done.clone(), Duration::from_secs(1));
        pool.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!pool.shutdown().await);
        assert_eq!(done.load(Ordering::SeqCst), 0);
        assert_eq!(store.pending_count().unwrap(), 1);
    }
}
