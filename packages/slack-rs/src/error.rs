use thiserror::Error;

/// Error codes that mean the target of a delete no longer exists.
const GONE_CODES: &[&str] = &["message_not_found", "file_not_found", "file_deleted"];

/// Error codes that will not succeed no matter how often the call is retried.
const PERMANENT_CODES: &[&str] = &[
    "channel_not_found",
    "not_in_channel",
    "is_archived",
    "invalid_auth",
    "not_authed",
    "token_revoked",
    "token_expired",
    "account_inactive",
    "missing_scope",
    "no_permission",
    "cant_delete_message",
    "cant_delete_file",
    "compliance_exports_prevent_deletion",
    "invalid_ts_latest",
];

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("request to Slack failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Slack rate limit hit (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("Slack returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Slack API error: {error}")]
    Api { error: String },

    #[error("failed to decode Slack response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SlackError {
    pub fn api(error: impl Into<String>) -> Self {
        SlackError::Api {
            error: error.into(),
        }
    }

    /// The Slack `error` code, when the API answered with `ok: false`.
    pub fn code(&self) -> Option<&str> {
        match self {
            SlackError::Api { error } => Some(error.as_str()),
            _ => None,
        }
    }

    /// True when a delete failed because the message or file is already gone.
    pub fn is_already_gone(&self) -> bool {
        self.code().is_some_and(|code| GONE_CODES.contains(&code))
    }

    /// True when a pagination cursor is stale or malformed. Restarting from
    /// the first page recovers.
    pub fn is_invalid_cursor(&self) -> bool {
        self.code() == Some("invalid_cursor")
    }

    /// True when retrying the same call cannot succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            SlackError::Api { error } => {
                GONE_CODES.contains(&error.as_str()) || PERMANENT_CODES.contains(&error.as_str())
            }
            SlackError::Status { status, .. } => (400..500).contains(status) && *status != 429,
            SlackError::Decode(_) => true,
            SlackError::Http(_) | SlackError::RateLimited { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gone_codes_are_permanent() {
        let err = SlackError::api("message_not_found");
        assert!(err.is_already_gone());
        assert!(err.is_permanent());
    }

    #[test]
    fn rate_limit_is_transient() {
        let err = SlackError::RateLimited {
            retry_after: Some(30),
        };
        assert!(!err.is_permanent());
        assert!(!err.is_already_gone());
    }

    #[test]
    fn auth_errors_are_permanent_but_not_gone() {
        let err = SlackError::api("token_revoked");
        assert!(err.is_permanent());
        assert!(!err.is_already_gone());
    }

    #[test]
    fn stale_cursor_is_recoverable() {
        let err = SlackError::api("invalid_cursor");
        assert!(err.is_invalid_cursor());
        assert!(!err.is_permanent());
        assert!(!SlackError::api("invalid_auth").is_invalid_cursor());
    }

    #[test]
    fn unknown_api_codes_are_retried() {
        assert!(!SlackError::api("internal_error").is_permanent());
    }

    #[test]
    fn server_errors_are_transient() {
        let err = SlackError::Status {
            status: 503,
            body: String::new(),
        };
        assert!(!err.is_permanent());

        let err = SlackError::Status {
            status: 404,
            body: String::new(),
        };
        assert!(err.is_permanent());
    }
}
