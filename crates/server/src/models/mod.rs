//! Domain models for the gateway.

pub mod session;
pub mod user;

pub use session::{CurrentUser, keys as session_keys};
pub use user::LocalUser;
