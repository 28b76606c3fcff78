//! Wire types for the authority's relying-party API.

use bankid_gateway_core::HintCode;
use serde::{Deserialize, Deserializer, Serialize};

/// `POST auth` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest<'a> {
    pub end_user_ip: String,
    /// Prefills the counterpart's app when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_number: Option<&'a str>,
}

/// `POST auth` response.
///
/// No `Debug`: `qr_start_secret` must never reach a log line.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub order_ref: String,
    pub auto_start_token: String,
    pub qr_start_token: String,
    pub qr_start_secret: String,
}

/// `POST collect` / `POST cancel` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRefRequest<'a> {
    pub order_ref: &'a str,
}

/// Status as reported by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Pending,
    Complete,
    Failed,
}

/// `POST collect` response.
///
/// `completion_data` stays untyped here so that a payload with a broken
/// shape can be told apart from a broken envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectResponse {
    pub order_ref: String,
    pub status: RemoteStatus,
    #[serde(default, deserialize_with = "remote_hint")]
    pub hint_code: Option<HintCode>,
    #[serde(default)]
    pub completion_data: Option<serde_json::Value>,
}

fn remote_hint<'de, D>(deserializer: D) -> Result<Option<HintCode>, D::Error>
where
    D: Deserializer<'de>,
{
    let code = Option::<String>::deserialize(deserializer)?;
    Ok(code.as_deref().map(HintCode::from_remote))
}
