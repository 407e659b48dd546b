// Business domains
pub mod cleanup;
pub mod tokens;
