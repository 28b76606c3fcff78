//! Business logic services for the gateway.
//!
//! # Services
//!
//! - `auth` - Initiate, collect, cancel, and QR rendering for orders
//! - `sessions` - Live sessions and the registry that holds them
//! - `poller` - One timer-driven polling task per order
//! - `identity` - Verified identity to local user upsert

pub mod auth;
pub mod identity;
pub mod poller;
pub mod sessions;

pub use auth::{AuthError, AuthService, InitiatedOrder};
pub use identity::{IdentityResolver, ResolveError};
pub use poller::PollSettings;
pub use sessions::{AuthSession, Resolution, SessionRegistry, SessionSnapshot};
