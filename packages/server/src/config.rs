use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use tracing::warn;

use crate::kernel::jobs::{Backoff, JobStoreConfig, RetryPolicy, WorkerPoolConfig};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub database_max_connections: u32,

    // Slack
    /// Expected `token` field on every slash command
    pub slack_verification_token: String,
    pub slack_api_base_url: String,
    /// Where users go to authorize the app
    pub app_url: String,

    // Job queue
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub job_lease: Duration,
    pub heartbeat_interval: Duration,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    pub max_attempts: i32,
    pub drain_timeout: Duration,

    // Cleanup behaviour
    pub rate_limit_delay: Duration,
    pub default_delete_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self {
            database_url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: parse_or(&lookup, "PORT", 8080)?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 20)?,
            slack_verification_token: lookup("VERIFICATION_TOKEN")
                .filter(|t| !t.is_empty())
                .context("VERIFICATION_TOKEN must be set")?,
            slack_api_base_url: lookup("SLACK_API_BASE_URL")
                .unwrap_or_else(|| slack::DEFAULT_BASE_URL.to_string()),
            app_url: lookup("APP_URL").unwrap_or_else(|| "http://localhost:8080/".to_string()),
            worker_count: parse_or(&lookup, "WORKER_COUNT", 2)?,
            poll_interval: Duration::from_millis(parse_or(&lookup, "JOB_POLL_INTERVAL_MS", 1000)?),
            job_lease: Duration::from_secs(parse_or(&lookup, "JOB_LEASE_SECS", 60)?),
            heartbeat_interval: Duration::from_secs(parse_or(&lookup, "JOB_HEARTBEAT_SECS", 20)?),
            retry_base: Duration::from_secs(parse_or(&lookup, "JOB_RETRY_BASE_SECS", 5)?),
            retry_cap: Duration::from_secs(parse_or(&lookup, "JOB_RETRY_CAP_SECS", 3600)?),
            max_attempts: parse_or(&lookup, "JOB_MAX_ATTEMPTS", 5)?,
            drain_timeout: Duration::from_secs(parse_or(&lookup, "WORKER_DRAIN_TIMEOUT_SECS", 30)?),
            rate_limit_delay: Duration::from_millis(parse_or(
                &lookup,
                "SLACK_RATE_LIMIT_DELAY_MS",
                1000,
            )?),
            default_delete_delay: Duration::from_secs(parse_or(
                &lookup,
                "DEFAULT_DELETE_DELAY_SECS",
                300,
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            bail!("WORKER_COUNT must be at least 1");
        }
        if self.max_attempts < 1 {
            bail!("JOB_MAX_ATTEMPTS must be at least 1");
        }
        if self.heartbeat_interval >= self.job_lease {
            bail!("JOB_HEARTBEAT_SECS must be shorter than JOB_LEASE_SECS");
        }
        if self.database_max_connections as usize <= self.worker_count {
            warn!(
                max_connections = self.database_max_connections,
                workers = self.worker_count,
                "database pool is not larger than the worker pool; producers may starve"
            );
        }
        Ok(())
    }

    pub fn job_store_config(&self) -> JobStoreConfig {
        JobStoreConfig {
            lease: self.job_lease,
            retry: RetryPolicy {
                backoff: Backoff {
                    base: self.retry_base,
                    cap: self.retry_cap,
                },
                max_attempts: self.max_attempts,
            },
        }
    }

    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            size: self.worker_count,
            poll_interval: self.poll_interval,
            heartbeat_interval: self.heartbeat_interval,
            drain_timeout: self.drain_timeout,
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .ok()
            .with_context(|| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}
