//! Gateway configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BANKID_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `BANKID_BASE_URL` - Public URL of this service
//! - `BANKID_API_URL` - Authority host, e.g. `https://appapi2.test.bankid.com`
//! - `BANKID_PFX` - Base64-encoded PKCS#12 client certificate bundle
//! - `BANKID_PASSPHRASE` - Passphrase for the bundle
//! - `BANKID_CA` - PEM root certificate the authority's server chain must lead to
//!
//! ## Optional
//! - `BANKID_HOST` - Bind address (default: 127.0.0.1)
//! - `BANKID_PORT` - Listen port (default: 3000)
//! - `BANKID_POLL_INTERVAL_SECS` - Seconds between collect calls (default: 2)
//! - `BANKID_ORDER_TTL_SECS` - Absolute order lifetime (default: 180)
//! - `BANKID_MAX_TRANSPORT_FAILURES` - Consecutive transport failures tolerated per order
//!   (default: 5)
//! - `BANKID_SESSION_RETENTION_SECS` - How long settled orders stay readable (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

/// Path of the relying-party API below the authority host.
const API_PATH: &str = "/rp/v6.0";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Gateway application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of this service
    pub base_url: String,
    /// Authority connection and order timing
    pub bankid: BankIdConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Authority connection settings and order timing.
///
/// Implements `Debug` manually to redact the certificate bundle and passphrase.
#[derive(Clone)]
pub struct BankIdConfig {
    /// Relying-party API root, e.g. `https://appapi2.test.bankid.com/rp/v6.0`
    pub api_url: String,
    /// Base64-encoded PKCS#12 bundle
    pub pfx: SecretString,
    /// Bundle passphrase
    pub passphrase: SecretString,
    /// PEM root certificate for the authority
    pub ca: String,
    /// Delay between two collect calls for the same order
    pub poll_interval: Duration,
    /// Absolute lifetime of an order
    pub order_ttl: Duration,
    /// Consecutive transport failures before an order fails with `network-error`
    pub max_transport_failures: u32,
    /// How long a settled order stays readable by callers
    pub session_retention: Duration,
}

impl Default for BankIdConfig {
    fn default() -> Self {
        Self {
            api_url: format!("https://appapi2.test.bankid.com{API_PATH}"),
            pfx: SecretString::from(String::new()),
            passphrase: SecretString::from(String::new()),
            ca: String::new(),
            poll_interval: Duration::from_secs(2),
            order_ttl: Duration::from_secs(180),
            max_transport_failures: 5,
            session_retention: Duration::from_secs(300),
        }
    }
}

impl std::fmt::Debug for BankIdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankIdConfig")
            .field("api_url", &self.api_url)
            .field("pfx", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .field("ca_len", &self.ca.len())
            .field("poll_interval", &self.poll_interval)
            .field("order_ttl", &self.order_ttl)
            .field("max_transport_failures", &self.max_transport_failures)
            .field("session_retention", &self.session_retention)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("BANKID_DATABASE_URL")?;
        let host = get_env_or_default("BANKID_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("BANKID_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("BANKID_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("BANKID_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("BANKID_BASE_URL")?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            bankid: BankIdConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl BankIdConfig {
    /// Load only the authority settings. Used by the CLI, which has no
    /// HTTP surface to configure.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            api_url: api_root(&get_required_env("BANKID_API_URL")?)?,
            pfx: get_required_secret("BANKID_PFX")?,
            passphrase: get_required_secret("BANKID_PASSPHRASE")?,
            ca: get_required_env("BANKID_CA")?,
            poll_interval: get_secs("BANKID_POLL_INTERVAL_SECS", 2)?,
            order_ttl: get_secs("BANKID_ORDER_TTL_SECS", 180)?,
            max_transport_failures: get_env_or_default("BANKID_MAX_TRANSPORT_FAILURES", "5")
                .parse::<u32>()
                .map_err(|e| {
                    ConfigError::InvalidEnvVar(
                        "BANKID_MAX_TRANSPORT_FAILURES".to_string(),
                        e.to_string(),
                    )
                })?,
            session_retention: get_secs("BANKID_SESSION_RETENTION_SECS", 300)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the cross-field rules environment parsing cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` naming the offending variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pfx.expose_secret().trim().is_empty() {
            return Err(invalid("BANKID_PFX", "must not be empty"));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("BANKID_POLL_INTERVAL_SECS", "must be positive"));
        }
        if self.order_ttl <= self.poll_interval {
            return Err(invalid(
                "BANKID_ORDER_TTL_SECS",
                "must be longer than the poll interval",
            ));
        }
        if self.max_transport_failures == 0 {
            return Err(invalid("BANKID_MAX_TRANSPORT_FAILURES", "must be at least 1"));
        }
        Ok(())
    }
}

/// Load only the database URL, for tools that never talk to the authority.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if neither `BANKID_DATABASE_URL` nor
/// `DATABASE_URL` is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    let _ = dotenvy::dotenv();
    get_database_url("BANKID_DATABASE_URL")
}

// =============================================================================
// Helper Functions
// =============================================================================

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidEnvVar(key.to_string(), reason.to_string())
}

/// Normalize the authority host into the relying-party API root.
fn api_root(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| invalid("BANKID_API_URL", &e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("BANKID_API_URL", "must have a host"));
    }
    let base = url.as_str().trim_end_matches('/');
    if base.ends_with(API_PATH) {
        Ok(base.to_string())
    } else {
        Ok(format!("{base}{API_PATH}"))
    }
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a whole number of seconds with a default.
fn get_secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    let raw = get_env_or_default(key, &default.to_string());
    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| invalid(key, &e.to_string()))?;
    Ok(Duration::from_secs(secs))
}
