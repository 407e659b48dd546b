//! Slack slash-command endpoints.
//!
//! - `/slashcommand/tmp`   post text, delete it after the default delay
//! - `/slashcommand/tmpt`  post text, delete it after N minutes (last word)
//! - `/slashcommand/clean` schedule a channel cleanup

use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{Extension, Form},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::domains::cleanup::{parse_clean_options, parse_timeout_text, CommandError};
use crate::kernel::{jobs::to_chrono, TokenRecord};
use crate::server::app::AppState;

/// Form fields Slack sends with every slash command.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlashCommand {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
}

/// Message shown only to the caller.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EphemeralReply {
    pub response_type: String,
    pub text: String,
}

impl EphemeralReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            response_type: "ephemeral".to_string(),
            text: text.into(),
        }
    }
}

/// Ways a slash command can be turned away.
#[derive(Debug)]
pub enum CommandRejection {
    BadVerificationToken,
    NotAuthorized { app_url: String },
    Invalid(CommandError),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for CommandRejection {
    fn from(err: anyhow::Error) -> Self {
        CommandRejection::Internal(err)
    }
}

impl From<CommandError> for CommandRejection {
    fn from(err: CommandError) -> Self {
        CommandRejection::Invalid(err)
    }
}

impl IntoResponse for CommandRejection {
    fn into_response(self) -> Response {
        match self {
            CommandRejection::BadVerificationToken => StatusCode::UNAUTHORIZED.into_response(),
            CommandRejection::NotAuthorized { app_url } => Json(EphemeralReply::new(format!(
                "Please authorize this app before continuing: {}",
                app_url
            )))
            .into_response(),
            CommandRejection::Invalid(err) => {
                info!(error = %err, "rejected slash command text");
                Json(EphemeralReply::new("Invalid Request")).into_response()
            }
            CommandRejection::Internal(err) => {
                error!(error = %format!("{:#}", err), "slash command failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// `/tmp <text>`
pub async fn tmp_handler(
    Extension(state): Extension<AppState>,
    Form(command): Form<SlashCommand>,
) -> Result<StatusCode, CommandRejection> {
    let delay = state.settings.default_delete_delay;
    let text = command.text.trim().to_string();
    if text.is_empty() {
        return Err(CommandError::EmptyMessage.into());
    }
    post_temporary(&state, &command, &text, delay).await
}

/// `/tmpt <text> <minutes>`
pub async fn tmpt_handler(
    Extension(state): Extension<AppState>,
    Form(command): Form<SlashCommand>,
) -> Result<StatusCode, CommandRejection> {
    let (text, delay) = parse_timeout_text(&command.text)?;
    post_temporary(&state, &command, &text, delay).await
}

/// `/clean [messages files bots]`
pub async fn clean_handler(
    Extension(state): Extension<AppState>,
    Form(command): Form<SlashCommand>,
) -> Result<Json<EphemeralReply>, CommandRejection> {
    let token = authorize(&state, &command).await?;
    let options = parse_clean_options(&command.text)?;

    let job_id = state
        .queue
        .queue_clean_channel(
            &token.access_token,
            &command.channel_id,
            &command.user_id,
            options,
        )
        .await?;

    info!(
        job_id = %job_id,
        channel_id = %command.channel_id,
        user_id = %command.user_id,
        "cleanup scheduled"
    );
    Ok(Json(EphemeralReply::new("Cleanup Request Scheduled")))
}

/// Post `text` as the caller and schedule its deletion after `delay`.
///
/// Posting and enqueueing run in their own task, so a request timeout can't
/// leave a posted message without its delete job.
async fn post_temporary(
    state: &AppState,
    command: &SlashCommand,
    text: &str,
    delay: Duration,
) -> Result<StatusCode, CommandRejection> {
    let token = authorize(state, command).await?;

    let state = state.clone();
    let channel_id = command.channel_id.clone();
    let text = text.to_string();
    let posted = tokio::spawn(async move {
        let client = state.deps.chat.for_token(&token.access_token);
        let ts = client.post_message(&channel_id, &text).await?;

        let delete_at = Utc::now() + to_chrono(delay);
        let job_id = state
            .queue
            .queue_delayed_delete(&token.access_token, &channel_id, &ts, delete_at)
            .await?;

        info!(
            job_id = %job_id,
            channel_id = %channel_id,
            ts = %ts,
            delete_at = %delete_at,
            "temporary message posted"
        );
        Ok::<_, anyhow::Error>(())
    });

    posted.await.context("temporary message task failed")??;
    Ok(StatusCode::OK)
}

/// Check the verification token and find the caller's access token.
async fn authorize(
    state: &AppState,
    command: &SlashCommand,
) -> Result<TokenRecord, CommandRejection> {
    if command.token != state.settings.verification_token {
        warn!(team_id = %command.team_id, command = %command.command, "bad verification token");
        return Err(CommandRejection::BadVerificationToken);
    }

    state
        .deps
        .tokens
        .get_token_by_user_id(&command.user_id)
        .await?
        .ok_or_else(|| CommandRejection::NotAuthorized {
            app_url: state.settings.app_url.clone(),
        })
}
