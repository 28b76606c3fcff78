//! Local user domain type.

use chrono::{DateTime, Utc};
use serde::Serialize;

use bankid_gateway_core::{PersonalNumber, UserId};

/// The gateway's own account record.
///
/// Keyed by email for users who signed up some other way, and by personal
/// number once an identity has been verified. Either key is unique once set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalUser {
    /// Unique user ID.
    pub id: UserId,
    /// Verified identity key.
    #[serde(skip)]
    pub personal_number: Option<PersonalNumber>,
    /// Email address, if the user registered one.
    pub email: Option<String>,
    /// Display name as reported by the authority.
    pub name: String,
    pub given_name: String,
    pub surname: String,
    /// When the identity was last verified.
    pub identity_verified_at: Option<DateTime<Utc>>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl LocalUser {
    /// Whether the user has ever completed an identity verification.
    #[must_use]
    pub const fn is_identity_verified(&self) -> bool {
        self.identity_verified_at.is_some()
    }
}
