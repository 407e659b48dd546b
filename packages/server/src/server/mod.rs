// HTTP server setup (Axum) and process bootstrap
pub mod app;
pub mod bootstrap;
pub mod routes;

pub use app::*;
