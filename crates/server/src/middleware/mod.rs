//! HTTP middleware stack for the gateway.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Session layer (tower-sessions with `PostgreSQL` store)
//! 4. Rate limiting on order initiation (governor)

pub mod auth;
pub mod client_ip;
pub mod rate_limit;
pub mod session;

pub use auth::{
    RequireAuth, clear_current_user, clear_pending_order, owns_order, set_current_user,
    set_pending_order,
};
pub use client_ip::ClientIp;
pub use rate_limit::initiate_rate_limiter;
pub use session::create_session_layer;
