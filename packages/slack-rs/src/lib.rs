// Thin client for the handful of Slack Web API methods the janitor needs.
// https://api.slack.com/methods

mod error;
pub mod models;

use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use crate::error::SlackError;
use crate::models::{
    FilesParams, FilesResponse, HistoryParams, HistoryResponse, PostMessageResponse,
};

pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

#[derive(Debug, Clone)]
pub struct SlackOptions {
    pub token: String,
    pub base_url: String,
}

impl SlackOptions {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct SlackService {
    options: SlackOptions,
    client: Client,
}

impl SlackService {
    pub fn new(options: SlackOptions) -> Self {
        Self::with_client(options, Client::new())
    }

    /// Share one connection pool between many per-token services.
    pub fn with_client(options: SlackOptions, client: Client) -> Self {
        Self { options, client }
    }

    /// `chat.postMessage` as the token's user.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
    ) -> Result<PostMessageResponse, SlackError> {
        let form = vec![
            ("channel", channel.to_string()),
            ("text", text.to_string()),
            ("as_user", "true".to_string()),
        ];
        self.call("chat.postMessage", &form).await
    }

    /// `chat.delete` for the message at `ts`.
    pub async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), SlackError> {
        let form = vec![
            ("channel", channel.to_string()),
            ("ts", ts.to_string()),
            ("as_user", "true".to_string()),
        ];
        self.call::<Value>("chat.delete", &form).await.map(|_| ())
    }

    /// `conversations.history`, newest first.
    pub async fn conversation_history(
        &self,
        params: &HistoryParams,
    ) -> Result<HistoryResponse, SlackError> {
        let mut form = vec![("channel", params.channel.clone())];
        if let Some(cursor) = &params.cursor {
            form.push(("cursor", cursor.clone()));
        }
        if let Some(latest) = &params.latest {
            form.push(("latest", latest.clone()));
        }
        if let Some(limit) = params.limit {
            form.push(("limit", limit.to_string()));
        }
        self.call("conversations.history", &form).await
    }

    /// `files.list` filtered by user and channel.
    pub async fn list_files(&self, params: &FilesParams) -> Result<FilesResponse, SlackError> {
        let mut form = vec![("page", params.page.max(1).to_string())];
        if let Some(user) = &params.user {
            form.push(("user", user.clone()));
        }
        if let Some(channel) = &params.channel {
            form.push(("channel", channel.clone()));
        }
        if let Some(count) = params.count {
            form.push(("count", count.to_string()));
        }
        self.call("files.list", &form).await
    }

    /// `files.delete`.
    pub async fn delete_file(&self, file_id: &str) -> Result<(), SlackError> {
        let form = vec![("file", file_id.to_string())];
        self.call::<Value>("files.delete", &form).await.map(|_| ())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        form: &[(&str, String)],
    ) -> Result<T, SlackError> {
        let url = format!("{}/{}", self.options.base_url.trim_end_matches('/'), method);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.options.token)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok());
            return Err(SlackError::RateLimited { retry_after });
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(SlackError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_envelope(&body)
    }
}

/// Unwrap Slack's `{ "ok": bool, "error": "..." }` envelope.
pub fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T, SlackError> {
    let value: Value = serde_json::from_str(body)?;

    if !value.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        if error == "ratelimited" {
            return Err(SlackError::RateLimited { retry_after: None });
        }
        return Err(SlackError::api(error));
    }

    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_error_is_surfaced() {
        let err = parse_envelope::<Value>(r#"{"ok":false,"error":"message_not_found"}"#)
            .unwrap_err();
        assert_eq!(err.code(), Some("message_not_found"));
    }

    #[test]
    fn envelope_ratelimited_maps_to_rate_limit() {
        let err = parse_envelope::<Value>(r#"{"ok":false,"error":"ratelimited"}"#).unwrap_err();
        assert!(matches!(err, SlackError::RateLimited { .. }));
    }

    #[test]
    fn history_page_decodes_cursor() {
        let body = r#"{
            "ok": true,
            "messages": [
                {"type": "message", "user": "U1", "ts": "100.1"},
                {"type": "message", "subtype": "bot_message", "bot_id": "B1", "ts": "99.0"}
            ],
            "has_more": true,
            "response_metadata": {"next_cursor": "bmV4dA=="}
        }"#;

        let history: HistoryResponse = parse_envelope(body).unwrap();
        assert_eq!(history.messages.len(), 2);
        assert!(history.has_more);
        assert_eq!(history.next_cursor(), Some("bmV4dA=="));
        assert_eq!(history.messages[1].subtype.as_deref(), Some("bot_message"));
    }

    #[test]
    fn empty_cursor_means_no_next_page() {
        let body = r#"{"ok": true, "messages": [], "has_more": false,
                       "response_metadata": {"next_cursor": ""}}"#;
        let history: HistoryResponse = parse_envelope(body).unwrap();
        assert_eq!(history.next_cursor(), None);
    }

    #[test]
    fn files_page_decodes_paging() {
        let body = r#"{"ok": true, "files": [{"id": "F1"}],
                       "paging": {"count": 100, "total": 1, "page": 1, "pages": 1}}"#;
        let files: FilesResponse = parse_envelope(body).unwrap();
        assert_eq!(files.files[0].id, "F1");
        assert_eq!(files.paging.pages, 1);
    }
}
