//! Effects for the cleanup domain.

pub mod job_handlers;

pub use job_handlers::{handle_clean_channel, handle_delayed_delete, register_cleanup_jobs};
