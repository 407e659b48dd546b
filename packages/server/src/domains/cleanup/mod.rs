//! Cleanup domain - scheduled message deletion and bulk channel cleanup
//!
//! # Components
//!
//! - `jobs/` - Job requests (DelayedDeleteRequest, CleanChannelRequest) and
//!   the QueueClient producer methods
//! - `effects/` - Job handlers run by the worker pool
//! - `commands` - Parsing of slash-command text

pub mod commands;
pub mod effects;
pub mod jobs;

pub use commands::{parse_clean_options, parse_timeout_text, CommandError, MAX_TIMEOUT_MINUTES};
pub use effects::register_cleanup_jobs;
pub use jobs::{CleanChannelOptions, CleanChannelProgress, CleanChannelRequest, DelayedDeleteRequest};
