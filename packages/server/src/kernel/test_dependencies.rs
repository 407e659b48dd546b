// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into ServerDeps for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use slack::SlackError;
use tokio::time::Instant;

use super::{
    BaseChatClient, BaseTokenStore, ChatClientFactory, ChatFile, ChatMessage, FilePage,
    HistoryPage, Paging, ServerDeps, TokenRecord,
};

// =============================================================================
// Mock Chat Client
// =============================================================================

/// A chat API call captured by [`MockChatClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCall {
    PostMessage { channel: String, text: String },
    DeleteMessage { channel: String, ts: String },
    ListHistory { channel: String, cursor: Option<String> },
    ListFiles { user: String, channel: String, page: u32 },
    DeleteFile { file_id: String },
}

impl ChatCall {
    fn op(&self) -> ChatOp {
        match self {
            ChatCall::PostMessage { .. } => ChatOp::PostMessage,
            ChatCall::DeleteMessage { .. } => ChatOp::DeleteMessage,
            ChatCall::ListHistory { .. } => ChatOp::ListHistory,
            ChatCall::ListFiles { .. } => ChatOp::ListFiles,
            ChatCall::DeleteFile { .. } => ChatOp::DeleteFile,
        }
    }
}

/// Which call a scripted failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatOp {
    PostMessage,
    DeleteMessage,
    ListHistory,
    ListFiles,
    DeleteFile,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub token: Option<String>,
    pub call: ChatCall,
    pub at: Instant,
}

#[derive(Default)]
struct MockChatState {
    history: HashMap<Option<String>, HistoryPage>,
    files: HashMap<u32, FilePage>,
    gone_messages: HashSet<String>,
    gone_files: HashSet<String>,
    failures: HashMap<ChatOp, VecDeque<SlackError>>,
    failing_deletes: HashMap<String, SlackError>,
    calls: Vec<RecordedCall>,
    next_ts: u64,
    post_delay: Option<Duration>,
}

/// Scripted chat API. Clones share state; [`ChatClientFactory::for_token`]
/// returns a clone that tags its calls with the token.
#[derive(Clone, Default)]
pub struct MockChatClient {
    state: Arc<Mutex<MockChatState>>,
    token: Option<String>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `page` when history is requested with `cursor`
    pub fn with_history_page(self, cursor: Option<&str>, page: HistoryPage) -> Self {
        self.state
            .lock()
            .unwrap()
            .history
            .insert(cursor.map(str::to_string), page);
        self
    }

    /// Serve `files` as page `page` of `pages`
    pub fn with_file_page(self, page: u32, pages: u32, files: Vec<ChatFile>) -> Self {
        self.state.lock().unwrap().files.insert(
            page,
            FilePage {
                files,
                paging: Paging { page, pages },
            },
        );
        self
    }

    /// `chat.postMessage` takes `delay` to answer, after Slack accepted the post
    pub fn with_post_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().post_delay = Some(delay);
        self
    }

    /// Deleting this message answers `message_not_found`
    pub fn with_deleted_message(self, ts: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .gone_messages
            .insert(ts.to_string());
        self
    }

    /// Deleting this file answers `file_not_found`
    pub fn with_deleted_file(self, file_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .gone_files
            .insert(file_id.to_string());
        self
    }

    /// Fail the next call of kind `op` with `error`
    pub fn fail_next(self, op: ChatOp, error: SlackError) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
        self
    }

    /// Fail the first delete of message `ts` with `error`
    pub fn fail_delete_of(self, ts: &str, error: SlackError) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(ts.to_string(), error);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Timestamps of successful and failed message deletes, in call order
    pub fn deleted_messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c.call {
                ChatCall::DeleteMessage { ts, .. } => Some(ts),
                _ => None,
            })
            .collect()
    }

    /// Cursors passed to each history call, in call order
    pub fn history_cursors(&self) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c.call {
                ChatCall::ListHistory { cursor, .. } => Some(cursor),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_files(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c.call {
                ChatCall::DeleteFile { file_id } => Some(file_id),
                _ => None,
            })
            .collect()
    }

    /// When each delete (message or file) was issued
    pub fn delete_times(&self) -> Vec<Instant> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c.call,
                    ChatCall::DeleteMessage { .. } | ChatCall::DeleteFile { .. }
                )
            })
            .map(|c| c.at)
            .collect()
    }

    pub fn count(&self, op: ChatOp) -> usize {
        self.calls().iter().filter(|c| c.call.op() == op).count()
    }

    fn record(&self, call: ChatCall) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let op = call.op();
        state.calls.push(RecordedCall {
            token: self.token.clone(),
            call,
            at: Instant::now(),
        });
        if let Some(error) = state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error.into());
        }
        Ok(())
    }
}

#[async_trait]
impl BaseChatClient for MockChatClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<String> {
        self.record(ChatCall::PostMessage {
            channel: channel.to_string(),
            text: text.to_string(),
        })?;
        let (ts, delay) = {
            let mut state = self.state.lock().unwrap();
            state.next_ts += 1;
            (format!("1700000000.{:06}", state.next_ts), state.post_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ts)
    }

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<()> {
        self.record(ChatCall::DeleteMessage {
            channel: channel.to_string(),
            ts: ts.to_string(),
        })?;
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.failing_deletes.remove(ts) {
            return Err(error.into());
        }
        if state.gone_messages.contains(ts) {
            return Err(SlackError::api("message_not_found").into());
        }
        Ok(())
    }

    async fn list_history(&self, channel: &str, cursor: Option<&str>) -> Result<HistoryPage> {
        self.record(ChatCall::ListHistory {
            channel: channel.to_string(),
            cursor: cursor.map(str::to_string),
        })?;
        let state = self.state.lock().unwrap();
        Ok(state
            .history
            .get(&cursor.map(str::to_string))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_files(&self, user: &str, channel: &str, page: u32) -> Result<FilePage> {
        self.record(ChatCall::ListFiles {
            user: user.to_string(),
            channel: channel.to_string(),
            page,
        })?;
        let state = self.state.lock().unwrap();
        Ok(state.files.get(&page).cloned().unwrap_or(FilePage {
            files: Vec::new(),
            paging: Paging { page, pages: page },
        }))
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.record(ChatCall::DeleteFile {
            file_id: file_id.to_string(),
        })?;
        if self.state.lock().unwrap().gone_files.contains(file_id) {
            return Err(SlackError::api("file_not_found").into());
        }
        Ok(())
    }
}

impl ChatClientFactory for MockChatClient {
    fn for_token(&self, token: &str) -> Arc<dyn BaseChatClient> {
        Arc::new(MockChatClient {
            state: self.state.clone(),
            token: Some(token.to_string()),
        })
    }
}

/// A user-authored `message` entry
pub fn user_message(ts: &str, user: &str) -> ChatMessage {
    ChatMessage {
        ts: ts.to_string(),
        message_type: "message".to_string(),
        user: Some(user.to_string()),
        subtype: None,
    }
}

/// A `bot_message` entry
pub fn bot_message(ts: &str) -> ChatMessage {
    ChatMessage {
        ts: ts.to_string(),
        message_type: "message".to_string(),
        user: None,
        subtype: Some("bot_message".to_string()),
    }
}

// =============================================================================
// In-memory Token Store
// =============================================================================

#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<String, TokenRecord>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, user_id: &str, access_token: &str) -> Self {
        self.tokens.lock().unwrap().insert(
            user_id.to_string(),
            TokenRecord {
                user_id: user_id.to_string(),
                team_id: "T0001".to_string(),
                team_name: Some("Test Team".to_string()),
                access_token: access_token.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl BaseTokenStore for InMemoryTokenStore {
    async fn get_token_by_user_id(&self, user_id: &str) -> Result<Option<TokenRecord>> {
        Ok(self.tokens.lock().unwrap().get(user_id).cloned())
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub chat: MockChatClient,
    pub tokens: Arc<InMemoryTokenStore>,
    pub rate_limit_delay: Duration,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            chat: MockChatClient::new(),
            tokens: Arc::new(InMemoryTokenStore::new()),
            rate_limit_delay: Duration::from_secs(1),
        }
    }

    /// Set a mock chat client
    pub fn mock_chat(mut self, chat: MockChatClient) -> Self {
        self.chat = chat;
        self
    }

    /// Set a token store
    pub fn mock_tokens(mut self, tokens: InMemoryTokenStore) -> Self {
        self.tokens = Arc::new(tokens);
        self
    }

    pub fn rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    /// Convert into ServerDeps for handlers and routes
    pub fn into_deps(self) -> Arc<ServerDeps> {
        Arc::new(ServerDeps::new(
            Arc::new(self.chat),
            self.tokens,
            self.rate_limit_delay,
        ))
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
