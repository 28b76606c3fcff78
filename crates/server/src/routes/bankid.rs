//! `BankID` order API routes.
//!
//! JSON endpoints the sign-in UI drives. The browser session that starts an
//! order is the only one allowed to poll, cancel, or render it.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_sessions::Session;
use tracing::info;

use bankid_gateway_core::{HintCode, OrderRef, OrderStatus, PersonalNumber};

use crate::db::UserStore;
use crate::error::{AppError, Result, set_sentry_user};
use crate::middleware::{
    ClientIp, clear_pending_order, owns_order, set_current_user, set_pending_order,
};
use crate::models::{CurrentUser, LocalUser};
use crate::services::AuthError;
use crate::state::AppState;

/// Request to start an order.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    /// Prefills the user's app. Blank means "any user".
    #[serde(default)]
    pub personal_number: Option<String>,
}

/// Response from starting an order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub order_ref: OrderRef,
    pub start_token: String,
    pub auto_start_token: String,
    pub auto_start_url: String,
}

/// Request naming an order.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRefRequest {
    pub order_ref: OrderRef,
}

/// Response from polling an order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectResponse {
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_code: Option<HintCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_user: Option<LocalUser>,
}

/// Response carrying the current QR payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrResponse {
    pub qr_data: String,
}

/// Start an order for the caller.
///
/// POST /api/auth/bankid/initiate
///
/// # Errors
///
/// Returns `AppError::BadRequest` for an unparseable personal number and
/// `AppError::Auth` if the authority refuses the order.
pub async fn initiate<S: UserStore>(
    State(state): State<AppState<S>>,
    ClientIp(end_user_ip): ClientIp,
    session: Session,
    Json(req): Json<InitiateRequest>,
) -> Result<Json<InitiateResponse>> {
    let personal_number = match req.personal_number.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            PersonalNumber::parse(raw)
                .map_err(|_| AppError::BadRequest("invalid personal number".to_string()))?,
        ),
    };

    let initiated = state
        .auth()
        .initiate(end_user_ip, personal_number.as_ref())
        .await?;
    set_pending_order(&session, &initiated.order_ref).await?;

    Ok(Json(InitiateResponse {
        order_ref: initiated.order_ref,
        start_token: initiated.start_token,
        auto_start_token: initiated.auto_start_token,
        auto_start_url: initiated.auto_start_url,
    }))
}

/// Poll the caller's order.
///
/// POST /api/auth/bankid/collect
///
/// On `complete` the resolved user is signed into the session and the order
/// is forgotten, so a second `complete` can never be read.
///
/// # Errors
///
/// Returns `AppError::Session` if the session store fails.
pub async fn collect<S: UserStore>(
    State(state): State<AppState<S>>,
    session: Session,
    Json(req): Json<OrderRefRequest>,
) -> Result<Json<CollectResponse>> {
    if !owns_order(&session, &req.order_ref).await {
        return Ok(Json(CollectResponse {
            status: OrderStatus::Failed,
            hint_code: Some(HintCode::UnknownOrder),
            resolved_user: None,
        }));
    }

    let snapshot = state.auth().collect(&req.order_ref).await;

    if let Some(user) = &snapshot.resolved_user {
        set_current_user(&session, &CurrentUser::from(user)).await?;
        clear_pending_order(&session).await?;
        state.auth().forget(&req.order_ref).await;
        set_sentry_user(&user.id);
        info!(user_id = %user.id, "User signed in");
    } else if snapshot.status.is_terminal() {
        clear_pending_order(&session).await?;
    }

    Ok(Json(CollectResponse {
        status: snapshot.status,
        hint_code: snapshot.hint_code,
        resolved_user: snapshot.resolved_user,
    }))
}

/// Cancel the caller's order.
///
/// POST /api/auth/bankid/cancel
///
/// # Errors
///
/// Returns `AppError::Auth` if the caller does not own the order.
pub async fn cancel<S: UserStore>(
    State(state): State<AppState<S>>,
    session: Session,
    Json(req): Json<OrderRefRequest>,
) -> Result<Json<Value>> {
    if !owns_order(&session, &req.order_ref).await {
        return Err(AuthError::UnknownOrder.into());
    }

    state.auth().cancel(&req.order_ref).await?;
    clear_pending_order(&session).await?;

    Ok(Json(json!({})))
}

/// Current animated QR payload for the caller's order.
///
/// POST /api/auth/bankid/qr
///
/// # Errors
///
/// Returns `AppError::Auth` if the caller does not own the order or it has
/// settled.
pub async fn qr<S: UserStore>(
    State(state): State<AppState<S>>,
    session: Session,
    Json(req): Json<OrderRefRequest>,
) -> Result<Json<QrResponse>> {
    if !owns_order(&session, &req.order_ref).await {
        return Err(AuthError::UnknownOrder.into());
    }

    let qr_data = state.auth().qr_data(&req.order_ref).await?;
    Ok(Json(QrResponse { qr_data }))
}
