//! Job handlers for the cleanup domain.
//!
//! These handlers are registered with the JobRegistry and called by JobWorkers.
//!
//! ```text
//! DelayedDeleteRequest → chat.delete                       → terminal
//! CleanChannelRequest  → history pages → chat.delete (×N)  ─┐
//!                        files pages   → files.delete (×N) ─┴→ terminal
//! ```
//!
//! Every delete is followed by the configured rate-limit pause. Deleting
//! something that is already gone counts as success, so a retried job can
//! safely repeat work from its last checkpoint.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::domains::cleanup::jobs::{CleanChannelRequest, DelayedDeleteRequest};
use crate::kernel::jobs::{JobContext, JobRegistry};
use crate::kernel::{is_already_gone, slack_error, BaseChatClient, ChatMessage};

/// Register every cleanup job type.
pub fn register_cleanup_jobs(registry: &mut JobRegistry) {
    registry.register::<DelayedDeleteRequest, _, _>(handle_delayed_delete);
    registry.register::<CleanChannelRequest, _, _>(handle_clean_channel);
}

/// Handle DelayedDeleteRequest: one `chat.delete` call.
pub async fn handle_delayed_delete(request: DelayedDeleteRequest, ctx: JobContext) -> Result<()> {
    let client = ctx.deps.chat.for_token(&request.token);

    let deleted = delete_message(client.as_ref(), &request.channel_id, &request.ts).await?;
    info!(
        job_id = %ctx.job_id,
        channel_id = %request.channel_id,
        ts = %request.ts,
        already_gone = !deleted,
        "delayed delete finished"
    );

    Ok(())
}

/// Handle CleanChannelRequest.
///
/// Walks channel history newest to oldest, then the user's files in the
/// channel. Progress is checkpointed after each page so a retry resumes at
/// the first unfinished page.
pub async fn handle_clean_channel(mut request: CleanChannelRequest, ctx: JobContext) -> Result<()> {
    let client = ctx.deps.chat.for_token(&request.token);
    let options = request.command_options;
    let delay = ctx.deps.rate_limit_delay;

    info!(
        job_id = %ctx.job_id,
        channel_id = %request.channel_id,
        user_id = %request.user_id,
        messages = options.delete_messages,
        files = options.delete_files,
        bots = options.delete_bot_messages,
        "cleaning channel"
    );

    let mut messages_deleted = 0usize;
    let mut files_deleted = 0usize;

    if options.scans_history() && !request.progress.history_done {
        loop {
            let page = match client
                .list_history(&request.channel_id, request.progress.history_cursor.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e)
                    if request.progress.history_cursor.is_some()
                        && slack_error(&e).is_some_and(|err| err.is_invalid_cursor()) =>
                {
                    // Deleted messages are skipped on a rescan
                    warn!(
                        job_id = %ctx.job_id,
                        channel_id = %request.channel_id,
                        "saved history cursor was rejected, rescanning from the newest page"
                    );
                    request.progress.history_cursor = None;
                    ctx.checkpoint(&request).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if page.messages.is_empty() {
                break;
            }

            for message in &page.messages {
                if !should_delete(&request, message) {
                    continue;
                }
                if delete_message(client.as_ref(), &request.channel_id, &message.ts).await? {
                    messages_deleted += 1;
                }
                tokio::time::sleep(delay).await;
            }

            match (page.has_more, page.next_cursor) {
                (true, Some(cursor)) => {
                    request.progress.history_cursor = Some(cursor);
                    ctx.checkpoint(&request).await?;
                }
                (true, None) => {
                    warn!(
                        job_id = %ctx.job_id,
                        channel_id = %request.channel_id,
                        "history reported more pages without a cursor, stopping"
                    );
                    break;
                }
                (false, _) => break,
            }
        }

        request.progress.history_cursor = None;
        request.progress.history_done = true;
        ctx.checkpoint(&request).await?;
    }

    if options.delete_files {
        loop {
            let requested = request.progress.files_page.max(1);
            let page = client
                .list_files(&request.user_id, &request.channel_id, requested)
                .await?;

            for file in &page.files {
                if delete_file(client.as_ref(), &file.id).await? {
                    files_deleted += 1;
                }
                tokio::time::sleep(delay).await;
            }

            if page.paging.page.max(requested) >= page.paging.pages {
                break;
            }

            // A page number that does not advance would loop forever.
            request.progress.files_page = page.paging.page.max(requested) + 1;
            ctx.checkpoint(&request).await?;
        }
    }

    info!(
        job_id = %ctx.job_id,
        channel_id = %request.channel_id,
        messages_deleted,
        files_deleted,
        "channel cleanup finished"
    );

    Ok(())
}

fn should_delete(request: &CleanChannelRequest, message: &ChatMessage) -> bool {
    if message.message_type != "message" {
        return false;
    }
    let options = &request.command_options;
    let own_message =
        options.delete_messages && message.user.as_deref() == Some(request.user_id.as_str());
    let bot_message =
        options.delete_bot_messages && message.subtype.as_deref() == Some("bot_message");
    own_message || bot_message
}

/// Returns false when the message was already gone.
async fn delete_message(client: &dyn BaseChatClient, channel: &str, ts: &str) -> Result<bool> {
    match client.delete_message(channel, ts).await {
        Ok(()) => Ok(true),
        Err(e) if is_already_gone(&e) => {
            debug!(channel_id = %channel, ts = %ts, "message already deleted");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Returns false when the file was already gone.
async fn delete_file(client: &dyn BaseChatClient, file_id: &str) -> Result<bool> {
    match client.delete_file(file_id).await {
        Ok(()) => Ok(true),
        Err(e) if is_already_gone(&e) => {
            debug!(file_id = %file_id, "file already deleted");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
