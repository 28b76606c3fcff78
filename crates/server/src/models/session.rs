//! Session-related types.
//!
//! Types stored in the HTTP session for authentication state.

use serde::{Deserialize, Serialize};

use bankid_gateway_core::UserId;

use super::user::LocalUser;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the signed-in user. The
/// personal number is deliberately left out of the cookie-backed store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
}

impl From<&LocalUser> for CurrentUser {
    fn from(user: &LocalUser) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
        }
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the order reference this browser session started.
    pub const PENDING_ORDER: &str = "pending_order";
}
