// HTTP routes
pub mod health;
pub mod slash_commands;

pub use health::*;
pub use slash_commands::*;
