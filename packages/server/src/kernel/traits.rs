// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Cleanup rules (which messages to delete, pacing) live in domains/cleanup.
//
// Naming convention: Base* for trait names (e.g., BaseChatClient, BaseTokenStore)

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// Chat Client Trait (Infrastructure - Slack Web API surface)
// =============================================================================

/// One entry from a channel's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub ts: String,
    /// Slack's `type` field; only `"message"` entries are cleanup candidates
    pub message_type: String,
    pub user: Option<String>,
    pub subtype: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPage {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFile {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    pub pages: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilePage {
    pub files: Vec<ChatFile>,
    pub paging: Paging,
}

/// Chat operations performed on behalf of one authorized user.
#[async_trait]
pub trait BaseChatClient: Send + Sync {
    /// Post `text` as the user; returns the message timestamp
    async fn post_message(&self, channel: &str, text: &str) -> Result<String>;

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<()>;

    /// One page of history, newest first. `cursor` of `None` starts at the newest message.
    async fn list_history(&self, channel: &str, cursor: Option<&str>) -> Result<HistoryPage>;

    /// One page of files uploaded by `user` to `channel` (pages start at 1)
    async fn list_files(&self, user: &str, channel: &str, page: u32) -> Result<FilePage>;

    async fn delete_file(&self, file_id: &str) -> Result<()>;
}

/// Builds a chat client bound to a user's access token.
pub trait ChatClientFactory: Send + Sync {
    fn for_token(&self, token: &str) -> Arc<dyn BaseChatClient>;
}

// =============================================================================
// Token Store Trait (Infrastructure - OAuth tokens per user)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TokenRecord {
    pub user_id: String,
    pub team_id: String,
    pub team_name: Option<String>,
    pub access_token: String,
}

#[async_trait]
pub trait BaseTokenStore: Send + Sync {
    /// Token saved when `user_id` authorized the app, if any
    async fn get_token_by_user_id(&self, user_id: &str) -> Result<Option<TokenRecord>>;
}
