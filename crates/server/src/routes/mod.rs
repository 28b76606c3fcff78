//! HTTP route handlers for the gateway.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                     - Liveness check
//! GET  /health/ready               - Readiness check (database)
//!
//! # BankID orders
//! POST /api/auth/bankid/initiate   - Start an order (rate limited)
//! POST /api/auth/bankid/collect    - Poll an order
//! POST /api/auth/bankid/cancel     - Cancel an order
//! POST /api/auth/bankid/qr         - Current animated QR payload
//!
//! # Session
//! GET  /api/auth/session           - Signed-in user
//! POST /api/auth/logout            - Sign out
//! ```

pub mod bankid;
pub mod session;

use axum::{
    Router,
    routing::{get, post},
};

use crate::db::UserStore;
use crate::middleware::initiate_rate_limiter;
use crate::state::AppState;

/// Create the `BankID` order routes router.
pub fn bankid_routes<S: UserStore>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/initiate",
            post(bankid::initiate::<S>).layer(initiate_rate_limiter()),
        )
        .route("/collect", post(bankid::collect::<S>))
        .route("/cancel", post(bankid::cancel::<S>))
        .route("/qr", post(bankid::qr::<S>))
}

/// Create all API routes for the gateway, over any user store.
pub fn routes<S: UserStore>() -> Router<AppState<S>> {
    Router::new()
        .nest("/api/auth/bankid", bankid_routes())
        .route("/api/auth/session", get(session::current::<S>))
        .route("/api/auth/logout", post(session::logout))
}
