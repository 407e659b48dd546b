// Chat Janitor - core library
//
// Slash commands enqueue durable jobs in Postgres; a worker pool claims them
// and runs the Slack cleanup handlers.
//
// Jobs are organized per-domain in domains/*/jobs/

pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
