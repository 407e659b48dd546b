//! HTTP server for Slack slash commands.
//!
//! Runs the slash-command routes and a worker pool in the same process.

use std::sync::Arc;

use anyhow::{Context, Result};
use janitor_core::kernel::jobs::{PostgresJobStore, QueueClient};
use janitor_core::server::{bootstrap, build_app, AppState, CommandSettings};
use janitor_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    tracing::info!("Starting Chat Janitor server");

    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = bootstrap::connect_database(&config).await?;
    let deps = bootstrap::build_deps(&config, pool.clone());

    let store = Arc::new(PostgresJobStore::with_config(
        pool.clone(),
        config.job_store_config(),
    ));
    let workers = bootstrap::start_workers(&config, pool.clone(), deps.clone());
    let shutdown = workers.shutdown_token();
    tokio::spawn(bootstrap::shutdown_signal(shutdown.clone()));

    let app = build_app(AppState {
        queue: QueueClient::new(store),
        deps,
        db_pool: Some(pool),
        settings: CommandSettings::from_config(&config),
    });

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("Server error")?;

    if !workers.shutdown().await {
        tracing::warn!("workers did not drain before the timeout");
    }
    tracing::info!("Server stopped");
    Ok(())
}
