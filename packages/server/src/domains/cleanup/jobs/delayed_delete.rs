//! DelayedDeleteRequest - remove one message at a scheduled time.

use serde::{Deserialize, Serialize};

use crate::kernel::jobs::{JobCommand, JobType};

/// Delete the message at `ts` in `channel_id` using the poster's token.
///
/// Enqueued by `/tmp` and `/tmpt` with `run_at` set to the delete time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedDeleteRequest {
    pub token: String,
    pub channel_id: String,
    pub ts: String,
}

impl DelayedDeleteRequest {
    pub fn new(
        token: impl Into<String>,
        channel_id: impl Into<String>,
        ts: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            channel_id: channel_id.into(),
            ts: ts.into(),
        }
    }
}

impl JobCommand for DelayedDeleteRequest {
    const JOB_TYPE: JobType = JobType::DelayedDelete;
}
