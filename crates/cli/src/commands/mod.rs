//! CLI command implementations.

pub mod login;
pub mod migrate;
pub mod user;
