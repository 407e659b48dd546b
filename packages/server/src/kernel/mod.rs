//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod jobs;
pub mod test_dependencies;
pub mod traits;

pub use deps::{is_already_gone, slack_error, ServerDeps, SlackAdapter, SlackClientFactory};
pub use test_dependencies::TestDependencies;
pub use traits::*;
