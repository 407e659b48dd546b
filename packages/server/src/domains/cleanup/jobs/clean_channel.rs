//! CleanChannelRequest - bulk removal of a user's messages, files and bot posts.

use serde::{Deserialize, Serialize};

use crate::kernel::jobs::{JobCommand, JobType};

/// What `/clean` should remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanChannelOptions {
    pub delete_messages: bool,
    pub delete_files: bool,
    pub delete_bot_messages: bool,
}

impl CleanChannelOptions {
    pub fn all() -> Self {
        Self {
            delete_messages: true,
            delete_files: true,
            delete_bot_messages: true,
        }
    }

    /// Whether the channel history has to be walked at all.
    pub fn scans_history(&self) -> bool {
        self.delete_messages || self.delete_bot_messages
    }
}

/// Where a partially completed cleanup should pick up on retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanChannelProgress {
    /// Cursor of the next unprocessed history page; `None` means the newest page
    pub history_cursor: Option<String>,
    pub history_done: bool,
    /// Next `files.list` page to process (1-based)
    pub files_page: u32,
}

impl Default for CleanChannelProgress {
    fn default() -> Self {
        Self {
            history_cursor: None,
            history_done: false,
            files_page: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanChannelRequest {
    pub token: String,
    pub channel_id: String,
    pub user_id: String,
    pub command_options: CleanChannelOptions,
    #[serde(default)]
    pub progress: CleanChannelProgress,
}

impl CleanChannelRequest {
    pub fn new(
        token: impl Into<String>,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        command_options: CleanChannelOptions,
    ) -> Self {
        Self {
            token: token.into(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            command_options,
            progress: CleanChannelProgress::default(),
        }
    }
}

impl JobCommand for CleanChannelRequest {
    const JOB_TYPE: JobType = JobType::CleanChannel;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_every_field() {
        let mut request = CleanChannelRequest::new(
            "xoxp-1",
            "C123",
            "U42",
            CleanChannelOptions {
                delete_messages: true,
                delete_files: false,
                delete_bot_messages: true,
            },
        );
        request.progress = CleanChannelProgress {
            history_cursor: Some("bmV4dA==".to_string()),
            history_done: false,
            files_page: 3,
        };

        let bytes = request.encode().unwrap();
        let decoded: CleanChannelRequest = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn payload_without_progress_starts_from_the_top() {
        let json = r#"{
            "token": "xoxp-1",
            "channel_id": "C123",
            "user_id": "U42",
            "command_options": {
                "delete_messages": true,
                "delete_files": true,
                "delete_bot_messages": false
            }
        }"#;

        let request: CleanChannelRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.progress, CleanChannelProgress::default());
        assert_eq!(request.progress.files_page, 1);
        assert!(request.command_options.scans_history());
    }

    #[test]
    fn files_only_does_not_scan_history() {
        let options = CleanChannelOptions {
            delete_messages: false,
            delete_files: true,
            delete_bot_messages: false,
        };
        assert!(!options.scans_history());
        assert!(CleanChannelOptions::all().scans_history());
    }
}
