//! Terminal sign-in.
//!
//! Starts one order, prints the autostart link and a fresh QR payload every
//! second until the order settles, then prints the resolved user. Useful for
//! checking certificates and connectivity against the test environment.
//!
//! # Environment Variables
//!
//! - `BANKID_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `BANKID_API_URL`, `BANKID_PFX`, `BANKID_PASSPHRASE`, `BANKID_CA` - authority access

use std::net::IpAddr;
use std::time::Duration;

use bankid_gateway_core::{OrderStatus, PersonalNumber};
use bankid_gateway_server::bankid::{BankIdClient, HttpTransport, TransportError};
use bankid_gateway_server::config::{self, BankIdConfig, ConfigError};
use bankid_gateway_server::db::{self, PgUserStore};
use bankid_gateway_server::services::{AuthError, AuthService};
use thiserror::Error;

/// How often a new QR payload is printed.
const QR_REFRESH: Duration = Duration::from_secs(1);

/// Errors that can occur during a terminal sign-in.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Certificate error: {0}")]
    Certificate(#[from] TransportError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid personal number: {0}")]
    InvalidPersonalNumber(String),

    #[error("Sign-in did not complete: {0}")]
    NotCompleted(String),
}

/// Run one sign-in and print the outcome.
///
/// # Errors
///
/// Returns `LoginError::NotCompleted` if the order fails or is cancelled.
pub async fn run(personal_number: Option<&str>, end_user_ip: IpAddr) -> Result<(), LoginError> {
    let personal_number = personal_number
        .map(|raw| {
            PersonalNumber::parse(raw)
                .map_err(|_| LoginError::InvalidPersonalNumber(raw.to_owned()))
        })
        .transpose()?;

    let bankid = BankIdConfig::from_env()?;
    let database_url = config::database_url_from_env()?;
    let pool = db::create_pool(&database_url).await?;

    let transport = HttpTransport::from_config(&bankid)?;
    let client = BankIdClient::new(transport, bankid.order_ttl);
    let auth = AuthService::new(client, PgUserStore::new(pool), &bankid);

    let initiated = auth.initiate(end_user_ip, personal_number.as_ref()).await?;
    tracing::info!(order_ref = %initiated.order_ref, "Order started");

    #[allow(clippy::print_stdout)]
    {
        println!("Open on this device: {}", initiated.auto_start_url);
        println!("Or scan the QR code built from the payloads below.");
    }

    let wait = auth.wait(&initiated.order_ref);
    tokio::pin!(wait);
    let mut ticker = tokio::time::interval(QR_REFRESH);

    let snapshot = loop {
        tokio::select! {
            snapshot = &mut wait => break snapshot?,
            _ = ticker.tick() => {
                // The order can settle between ticks; the next select picks that up.
                if let Ok(qr_data) = auth.qr_data(&initiated.order_ref).await {
                    #[allow(clippy::print_stdout)]
                    {
                        println!("{qr_data}");
                    }
                }
            }
        }
    };

    match (snapshot.status, snapshot.resolved_user) {
        (OrderStatus::Complete, Some(user)) => {
            #[allow(clippy::print_stdout)]
            {
                println!("Signed in as {} ({})", user.name, user.id);
            }
            Ok(())
        }
        (status, _) => Err(LoginError::NotCompleted(format!(
            "{status} ({})",
            snapshot
                .hint_code
                .as_ref()
                .map_or("no hint", |hint| hint.as_str())
        ))),
    }
}
