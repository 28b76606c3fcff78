//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::bankid::HttpTransport;
use crate::config::AppConfig;
use crate::db::{PgUserStore, UserStore};
use crate::services::AuthService;

/// The authentication service behind the HTTP API. Production uses the
/// Postgres store.
pub type GatewayAuthService<S = PgUserStore> = AuthService<HttpTransport, S>;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Holds the single process-wide protocol client
/// (inside the auth service) so certificate material is loaded once.
pub struct AppState<S = PgUserStore> {
    inner: Arc<AppStateInner<S>>,
}

// Manual impl: `S` itself need not be `Clone`
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<S> {
    config: AppConfig,
    pool: PgPool,
    auth: GatewayAuthService<S>,
}

impl<S: UserStore> AppState<S> {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: AppConfig, pool: PgPool, auth: GatewayAuthService<S>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, pool, auth }),
        }
    }

    /// Get a reference to the gateway configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the authentication service.
    #[must_use]
    pub fn auth(&self) -> &GatewayAuthService<S> {
        &self.inner.auth
    }
}
