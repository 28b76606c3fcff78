//! Local user lookup.
//!
//! # Usage
//!
//! ```bash
//! bgw user show 198001011234
//! ```

use bankid_gateway_core::PersonalNumber;
use bankid_gateway_server::config::{self, ConfigError};
use bankid_gateway_server::db::{self, PgUserStore, RepositoryError, UserStore};
use thiserror::Error;

/// Errors that can occur during user lookups.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Invalid personal number: {0}")]
    InvalidPersonalNumber(String),

    #[error("No user with personal number {0}")]
    NotFound(String),
}

/// Print the local user bound to a personal number.
///
/// # Errors
///
/// Returns `UserError::NotFound` if no user has verified that identity.
pub async fn show(personal_number: &str) -> Result<(), UserError> {
    let personal_number = PersonalNumber::parse(personal_number)
        .map_err(|_| UserError::InvalidPersonalNumber(personal_number.to_owned()))?;

    let database_url = config::database_url_from_env()?;
    let pool = db::create_pool(&database_url).await?;
    let store = PgUserStore::new(pool);

    let user = store
        .find_by_personal_number(&personal_number)
        .await?
        .ok_or_else(|| UserError::NotFound(personal_number.masked()))?;

    #[allow(clippy::print_stdout)]
    {
        println!("id:         {}", user.id);
        println!("name:       {}", user.name);
        println!("email:      {}", user.email.as_deref().unwrap_or("-"));
        match user.identity_verified_at {
            Some(at) => println!("verified:   {}", at.to_rfc3339()),
            None => println!("verified:   never"),
        }
        println!("created:    {}", user.created_at.to_rfc3339());
    }

    Ok(())
}
