//! `BankID` Gateway - electronic-identity sign-in service.
//!
//! Serves the JSON sign-in API (default port 3000).
//!
//! # Architecture
//!
//! - Axum, JSON only
//! - One process-wide `BankID` client; the PKCS#12 identity is loaded at startup
//! - One polling task per order, stopped by cancellation or expiry
//! - `PostgreSQL` for local users and HTTP sessions

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use sentry::integrations::tracing::{self as sentry_tracing, EventFilter};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bankid_gateway_server::bankid::{BankIdClient, HttpTransport};
use bankid_gateway_server::config::AppConfig;
use bankid_gateway_server::db::{self, PgUserStore};
use bankid_gateway_server::middleware;
use bankid_gateway_server::routes;
use bankid_gateway_server::services::AuthService;
use bankid_gateway_server::state::AppState;

const DEFAULT_LOG_FILTER: &str = "bankid_gateway_server=info,tower_http=debug";

/// Start Sentry when a DSN is configured. The guard flushes on drop.
fn init_sentry(config: &AppConfig) -> Option<sentry::ClientInitGuard> {
    let options = sentry::ClientOptions {
        release: sentry::release_name!(),
        environment: config.sentry_environment.clone().map(Cow::Owned),
        attach_stacktrace: true,
        ..Default::default()
    };
    let guard = sentry::init((config.sentry_dsn.as_deref()?, options));
    tracing::info!("Sentry enabled");
    Some(guard)
}

/// Warnings and errors become Sentry events; info and debug become breadcrumbs.
fn sentry_filter(metadata: &tracing::Metadata<'_>) -> EventFilter {
    let level = *metadata.level();
    if level <= Level::WARN {
        EventFilter::Event
    } else if level <= Level::DEBUG {
        EventFilter::Breadcrumb
    } else {
        EventFilter::Ignore
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_filter))
        .init();
}

fn app(state: AppState) -> Router {
    let sessions = middleware::create_session_layer(state.pool(), state.config());

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes::<PgUserStore>())
        .layer(sessions)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        // Outermost so every request gets a hub and a transaction
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

#[tokio::main]
async fn main() {
    // Sentry needs the DSN before the subscriber is installed
    let config = AppConfig::from_env().expect("invalid configuration");
    let _sentry = init_sentry(&config);
    init_tracing();

    // Schema changes are applied out of band with `bgw migrate`
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("database unreachable");

    // Certificate material is loaded exactly once, here
    let transport = HttpTransport::from_config(&config.bankid)
        .expect("BankID client certificate could not be loaded");
    tracing::info!(api_url = %config.bankid.api_url, "BankID transport ready");

    let client = BankIdClient::new(transport, config.bankid.order_ttl);
    let auth = AuthService::new(client, PgUserStore::new(pool.clone()), &config.bankid);
    let addr = config.socket_addr();
    let router = app(AppState::new(config, pool, auth));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("cannot bind listen address");
    tracing::info!(%addr, "bankid gateway listening");

    // Peer addresses back the end-user IP when no proxy header is present
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server terminated with an error");
}

/// Liveness: the process is up.
async fn health() -> &'static str {
    "ok"
}

/// Readiness: the database answers. 503 otherwise.
async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match sqlx::query("SELECT 1").execute(state.pool()).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "database": "ok" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "database": "unavailable" })),
            )
        }
    }
}

/// Resolves on Ctrl+C, or on SIGTERM where available.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("SIGTERM handler");
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Ctrl+C handler failed");
                }
            }
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Ctrl+C handler failed");
    }

    tracing::info!("Shutting down, draining in-flight requests");
}
