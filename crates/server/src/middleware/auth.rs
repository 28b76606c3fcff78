//! Authentication extractors and session helpers.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

use bankid_gateway_core::OrderRef;

use crate::models::{CurrentUser, session_keys};

/// Extractor that requires a signed-in user.
///
/// Responds `401` when the session has no user.
pub struct RequireAuth(pub CurrentUser);

/// Rejection for [`RequireAuth`].
pub struct Unauthorized;

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = Unauthorized;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts.extensions.get::<Session>().ok_or(Unauthorized)?;

        let user: CurrentUser = session
            .get(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten()
            .ok_or(Unauthorized)?;

        Ok(Self(user))
    }
}

/// Sign `user` into the session, rotating the session id first.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

/// Remember which order this browser session started.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_pending_order(
    session: &Session,
    order_ref: &OrderRef,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::PENDING_ORDER, order_ref).await
}

/// Whether this browser session started `order_ref`.
pub async fn owns_order(session: &Session, order_ref: &OrderRef) -> bool {
    session
        .get::<OrderRef>(session_keys::PENDING_ORDER)
        .await
        .ok()
        .flatten()
        .is_some_and(|owned| &owned == order_ref)
}

/// Forget the order this browser session started.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_pending_order(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<OrderRef>(session_keys::PENDING_ORDER)
        .await?;
    Ok(())
}
