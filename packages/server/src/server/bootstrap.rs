//! Process wiring shared by the `server` and `worker` binaries.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::domains::cleanup::register_cleanup_jobs;
use crate::domains::tokens::PostgresTokenStore;
use crate::kernel::jobs::{JobRegistry, PostgresJobStore, SharedJobRegistry, WorkerPool};
use crate::kernel::{ServerDeps, SlackClientFactory};

/// Initialize logging; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,janitor_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();
}

/// Connect to Postgres and bring the schema up to date.
pub async fn connect_database(config: &Config) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    Ok(pool)
}

/// Slack client factory and token store backed by `pool`.
pub fn build_deps(config: &Config, pool: PgPool) -> Arc<ServerDeps> {
    Arc::new(ServerDeps::new(
        Arc::new(SlackClientFactory::new(config.slack_api_base_url.clone())),
        Arc::new(PostgresTokenStore::new(pool)),
        config.rate_limit_delay,
    ))
}

pub fn build_registry() -> SharedJobRegistry {
    let mut registry = JobRegistry::new();
    register_cleanup_jobs(&mut registry);
    Arc::new(registry)
}

/// Start the worker pool against the Postgres job store.
pub fn start_workers(config: &Config, pool: PgPool, deps: Arc<ServerDeps>) -> WorkerPool {
    let store = Arc::new(PostgresJobStore::with_config(pool, config.job_store_config()));
    let mut workers = WorkerPool::new(store, build_registry(), deps, config.worker_pool_config());
    workers.start();
    workers
}

/// Cancel `token` on Ctrl-C or SIGTERM.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl-C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    token.cancel();
}
