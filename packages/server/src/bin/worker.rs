//! Standalone job worker.
//!
//! Claims and runs cleanup jobs without serving HTTP; run as many of these as
//! the Slack rate limits allow.

use anyhow::{Context, Result};
use janitor_core::server::bootstrap;
use janitor_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    tracing::info!("Starting Chat Janitor worker");

    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = bootstrap::connect_database(&config).await?;
    let deps = bootstrap::build_deps(&config, pool.clone());

    let workers = bootstrap::start_workers(&config, pool, deps);
    let shutdown = workers.shutdown_token();
    bootstrap::shutdown_signal(shutdown).await;

    if !workers.shutdown().await {
        tracing::warn!("workers did not drain before the timeout");
    }
    tracing::info!("Worker stopped");
    Ok(())
}
