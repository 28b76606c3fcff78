//! Order protocol client: `auth`, `collect`, and `cancel`.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use secrecy::SecretString;
use tracing::{debug, info, instrument, warn};

use bankid_gateway_core::{
    AuthOrder, CollectReport, CompletionData, HintCode, OrderRef, PersonalNumber, StartTokens,
};

use super::ProtocolError;
use super::transport::Transport;
use super::types::{AuthRequest, AuthResponse, CollectResponse, OrderRefRequest, RemoteStatus};
use super::verify::{CompletionVerifier, TrustAuthority};

/// Client for the authority's order protocol.
///
/// Built once at startup and shared; the transport inside carries the
/// process-wide certificate material.
pub struct BankIdClient<T> {
    transport: T,
    verifier: Arc<dyn CompletionVerifier>,
    order_ttl: chrono::Duration,
}

impl<T: Transport> BankIdClient<T> {
    /// Create a client that trusts the authority's completion payloads.
    #[must_use]
    pub fn new(transport: T, order_ttl: std::time::Duration) -> Self {
        Self::with_verifier(transport, order_ttl, Arc::new(TrustAuthority))
    }

    /// Create a client with a custom completion verifier.
    #[must_use]
    pub fn with_verifier(
        transport: T,
        order_ttl: std::time::Duration,
        verifier: Arc<dyn CompletionVerifier>,
    ) -> Self {
        Self {
            transport,
            verifier,
            order_ttl: chrono::Duration::from_std(order_ttl)
                .unwrap_or_else(|_| chrono::Duration::minutes(3)),
        }
    }

    /// Start a new order for the end user at `end_user_ip`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Transport` if the authority cannot be reached
    /// or refuses the order, `ProtocolError::Malformed` if its answer cannot
    /// be decoded.
    #[instrument(
        skip(self, personal_number),
        fields(end_user_ip = %end_user_ip, prefilled = personal_number.is_some())
    )]
    pub async fn initiate(
        &self,
        end_user_ip: IpAddr,
        personal_number: Option<&PersonalNumber>,
    ) -> Result<AuthOrder, ProtocolError> {
        let request = AuthRequest {
            end_user_ip: end_user_ip.to_string(),
            personal_number: personal_number.map(PersonalNumber::as_str),
        };

        let body = self
            .transport
            .send("auth", serde_json::to_value(&request)?)
            .await?;
        let response: AuthResponse = serde_json::from_value(body)?;

        let order = AuthOrder::pending(
            OrderRef::new(response.order_ref),
            StartTokens {
                auto_start_token: response.auto_start_token,
                start_token: response.qr_start_token,
                start_secret: SecretString::from(response.qr_start_secret),
            },
            Utc::now(),
            self.order_ttl,
        );

        info!(order_ref = %order.order_ref(), "Order initiated");
        Ok(order)
    }

    /// Read the current state of an order.
    ///
    /// Never fails: every problem is folded into a `Failed` report whose hint
    /// code says what went wrong (`network-error` for transport trouble,
    /// `unknown-order`, or `malformed-response`). Safe to repeat.
    #[instrument(skip(self), fields(order_ref = %order_ref))]
    pub async fn collect(&self, order_ref: &OrderRef) -> CollectReport {
        match self.try_collect(order_ref).await {
            Ok(report) => {
                debug!(status = %report.status, hint = ?report.hint_code, "Collected order status");
                report
            }
            Err(err) => {
                let hint = err.hint_code();
                warn!(error = %err, hint = %hint, "Collect failed");
                CollectReport::failed(hint)
            }
        }
    }

    async fn try_collect(&self, order_ref: &OrderRef) -> Result<CollectReport, ProtocolError> {
        let request = OrderRefRequest {
            order_ref: order_ref.as_str(),
        };
        let body = self
            .transport
            .send("collect", serde_json::to_value(&request)?)
            .await?;
        let response: CollectResponse = serde_json::from_value(body)?;

        if response.order_ref != order_ref.as_str() {
            return Err(ProtocolError::OrderMismatch {
                expected: order_ref.to_string(),
                received: response.order_ref,
            });
        }

        match response.status {
            RemoteStatus::Pending => Ok(CollectReport::pending(response.hint_code)),
            RemoteStatus::Failed => Ok(CollectReport::failed(
                response
                    .hint_code
                    .unwrap_or_else(|| HintCode::Other("unspecified".to_owned())),
            )),
            RemoteStatus::Complete => {
                let raw = response
                    .completion_data
                    .ok_or(ProtocolError::IncompleteCompletion)?;
                let completion: CompletionData = serde_json::from_value(raw)?;
                if !completion.is_well_formed() {
                    return Err(ProtocolError::IncompleteCompletion);
                }
                self.verifier.verify(&completion)?;
                Ok(CollectReport::complete(completion))
            }
        }
    }

    /// Ask the authority to drop an order.
    ///
    /// Best effort: the order expires on its own anyway, so failures are
    /// only logged.
    #[instrument(skip(self), fields(order_ref = %order_ref))]
    pub async fn cancel(&self, order_ref: &OrderRef) {
        let request = OrderRefRequest {
            order_ref: order_ref.as_str(),
        };
        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Could not encode cancel request");
                return;
            }
        };

        match self.transport.send("cancel", body).await {
            Ok(_) => debug!("Order cancelled at authority"),
            Err(e) => warn!(error = %e, "Cancel request failed; order will expire on its own"),
        }
    }
}
