//! Application setup and router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method, StatusCode},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::kernel::jobs::QueueClient;
use crate::kernel::ServerDeps;
use crate::server::routes::{clean_handler, health_handler, tmp_handler, tmpt_handler};

/// Settings the slash-command routes need at request time.
#[derive(Debug, Clone)]
pub struct CommandSettings {
    /// Expected `token` field on every slash command
    pub verification_token: String,
    /// Sent to users who have not authorized the app yet
    pub app_url: String,
    /// Lifetime of a `/tmp` message
    pub default_delete_delay: Duration,
}

impl CommandSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            verification_token: config.slack_verification_token.clone(),
            app_url: config.app_url.clone(),
            default_delete_delay: config.default_delete_delay,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub queue: QueueClient,
    pub deps: Arc<ServerDeps>,
    /// `None` when running against the in-memory store
    pub db_pool: Option<PgPool>,
    pub settings: CommandSettings,
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        // Slack slash commands
        .route("/slashcommand/tmp", post(tmp_handler))
        .route("/slashcommand/tmpt", post(tmpt_handler))
        .route("/slashcommand/clean", post(clean_handler))
        // Health check
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(state))
        // Slack gives up on slash commands after 3 seconds
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(3),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
