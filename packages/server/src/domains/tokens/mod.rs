//! Tokens domain - OAuth access tokens saved when a user authorizes the app

pub mod models;
mod store;

pub use models::SlackToken;
pub use store::PostgresTokenStore;
