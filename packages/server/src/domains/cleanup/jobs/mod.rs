//! Job requests for the cleanup domain and their producer API.

mod clean_channel;
mod delayed_delete;

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use clean_channel::{CleanChannelOptions, CleanChannelProgress, CleanChannelRequest};
pub use delayed_delete::DelayedDeleteRequest;

use crate::kernel::jobs::QueueClient;

impl QueueClient {
    /// Schedule deletion of the message at `ts` for `delete_at`.
    pub async fn queue_delayed_delete(
        &self,
        token: &str,
        channel_id: &str,
        ts: &str,
        delete_at: DateTime<Utc>,
    ) -> Result<Uuid> {
        let request = DelayedDeleteRequest::new(token, channel_id, ts);
        self.enqueue(&request, Some(delete_at)).await
    }

    /// Schedule an immediate channel cleanup for `user_id`.
    pub async fn queue_clean_channel(
        &self,
        token: &str,
        channel_id: &str,
        user_id: &str,
        options: CleanChannelOptions,
    ) -> Result<Uuid> {
        let request = CleanChannelRequest::new(token, channel_id, user_id, options);
        self.enqueue(&request, None).await
    }
}
