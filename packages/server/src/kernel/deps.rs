//! Server dependencies for job handlers and routes (using traits for testability)
//!
//! All external services sit behind trait abstractions so handlers can run
//! against mocks in tests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use slack::models::{FilesParams, HistoryParams};
use slack::{SlackError, SlackOptions, SlackService};

use crate::kernel::{
    BaseChatClient, BaseTokenStore, ChatClientFactory, ChatFile, ChatMessage, FilePage,
    HistoryPage, Paging,
};

/// History page size requested from Slack.
const HISTORY_PAGE_SIZE: u32 = 200;
/// Files page size requested from Slack.
const FILES_PAGE_SIZE: u32 = 100;

// =============================================================================
// SlackService Adapter (implements BaseChatClient trait)
// =============================================================================

/// Wrapper around SlackService that implements BaseChatClient trait
pub struct SlackAdapter(pub SlackService);

impl SlackAdapter {
    pub fn new(service: SlackService) -> Self {
        Self(service)
    }
}

#[async_trait]
impl BaseChatClient for SlackAdapter {
    async fn post_message(&self, channel: &str, text: &str) -> Result<String> {
        let response = self
            .0
            .post_message(channel, text)
            .await
            .with_context(|| format!("chat.postMessage to {} failed", channel))?;
        Ok(response.ts)
    }

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<()> {
        self.0
            .delete_message(channel, ts)
            .await
            .with_context(|| format!("chat.delete {} in {} failed", ts, channel))
    }

    async fn list_history(&self, channel: &str, cursor: Option<&str>) -> Result<HistoryPage> {
        let params = HistoryParams {
            channel: channel.to_string(),
            cursor: cursor.map(str::to_string),
            limit: Some(HISTORY_PAGE_SIZE),
            ..Default::default()
        };
        let response = self
            .0
            .conversation_history(&params)
            .await
            .with_context(|| format!("conversations.history for {} failed", channel))?;

        let next_cursor = response.next_cursor().map(str::to_string);
        Ok(HistoryPage {
            messages: response
                .messages
                .into_iter()
                .map(|m| ChatMessage {
                    ts: m.ts,
                    message_type: m.message_type,
                    user: m.user,
                    subtype: m.subtype,
                })
                .collect(),
            has_more: response.has_more,
            next_cursor,
        })
    }

    async fn list_files(&self, user: &str, channel: &str, page: u32) -> Result<FilePage> {
        let params = FilesParams {
            user: Some(user.to_string()),
            channel: Some(channel.to_string()),
            page,
            count: Some(FILES_PAGE_SIZE),
        };
        let response = self
            .0
            .list_files(&params)
            .await
            .with_context(|| format!("files.list page {} for {} failed", page, channel))?;

        Ok(FilePage {
            files: response
                .files
                .into_iter()
                .map(|f| ChatFile {
                    id: f.id,
                    name: f.name,
                })
                .collect(),
            paging: Paging {
                page: response.paging.page,
                pages: response.paging.pages,
            },
        })
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.0
            .delete_file(file_id)
            .await
            .with_context(|| format!("files.delete {} failed", file_id))
    }
}

/// Creates a [`SlackAdapter`] per token, sharing one HTTP connection pool.
#[derive(Clone)]
pub struct SlackClientFactory {
    http: reqwest::Client,
    base_url: String,
}

impl SlackClientFactory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl ChatClientFactory for SlackClientFactory {
    fn for_token(&self, token: &str) -> Arc<dyn BaseChatClient> {
        let options = SlackOptions::new(token).with_base_url(self.base_url.clone());
        Arc::new(SlackAdapter::new(SlackService::with_client(
            options,
            self.http.clone(),
        )))
    }
}

/// The Slack error behind an adapter error, if there is one.
pub fn slack_error(err: &anyhow::Error) -> Option<&SlackError> {
    err.chain().find_map(|cause| cause.downcast_ref::<SlackError>())
}

/// True when a delete failed only because the target no longer exists.
pub fn is_already_gone(err: &anyhow::Error) -> bool {
    slack_error(err).is_some_and(SlackError::is_already_gone)
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Server dependencies accessible to job handlers and routes
#[derive(Clone)]
pub struct ServerDeps {
    pub chat: Arc<dyn ChatClientFactory>,
    pub tokens: Arc<dyn BaseTokenStore>,
    /// Pause after every delete to stay under Slack's tier limits
    pub rate_limit_delay: Duration,
}

impl ServerDeps {
    pub fn new(
        chat: Arc<dyn ChatClientFactory>,
        tokens: Arc<dyn BaseTokenStore>,
        rate_limit_delay: Duration,
    ) -> Self {
        Self {
            chat,
            tokens,
            rate_limit_delay,
        }
    }
}
