//! Sign-in session routes.

use axum::{Json, extract::State};
use serde_json::{Value, json};
use tower_sessions::Session;

use crate::db::UserStore;
use crate::error::{AppError, Result, clear_sentry_user};
use crate::middleware::{RequireAuth, clear_current_user};
use crate::models::LocalUser;
use crate::state::AppState;

/// The signed-in user.
///
/// GET /api/auth/session
///
/// Only users whose identity has been verified count as signed in.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if nobody is signed in, the user no
/// longer exists, or the user was never identity-verified.
pub async fn current<S: UserStore>(
    State(state): State<AppState<S>>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<LocalUser>> {
    let user = state
        .auth()
        .resolver()
        .store()
        .get_by_id(current.id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !user.is_identity_verified() {
        return Err(AppError::Unauthorized);
    }

    Ok(Json(user))
}

/// Sign out.
///
/// POST /api/auth/logout
///
/// # Errors
///
/// Returns `AppError::Session` if the session store fails.
pub async fn logout(session: Session) -> Result<Json<Value>> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(Json(json!({})))
}
