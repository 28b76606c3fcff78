//! Authentication service.
//!
//! Ties the protocol client, the session registry, the polling tasks, and the
//! identity resolver together behind the four operations callers need.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, instrument};

use bankid_gateway_core::{HintCode, OrderRef, OrderStatus, PersonalNumber};

use super::identity::IdentityResolver;
use super::poller::{self, PollSettings};
use super::sessions::{AuthSession, SessionRegistry, SessionSnapshot};
use crate::bankid::qr::{self, QrError};
use crate::bankid::{BankIdClient, ProtocolError, Transport};
use crate::config::BankIdConfig;
use crate::db::UserStore;

/// Errors surfaced by the authentication service.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authority refused or could not be asked to start an order.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No live session for this order reference.
    #[error("unknown order")]
    UnknownOrder,

    /// The order has already settled.
    #[error("order is no longer pending")]
    NotPending,

    /// QR payload could not be computed.
    #[error("qr error: {0}")]
    Qr(#[from] QrError),
}

/// What the initiating caller gets back. Never includes the start secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedOrder {
    pub order_ref: OrderRef,
    pub start_token: String,
    pub auto_start_token: String,
    pub auto_start_url: String,
}

/// Authentication service.
///
/// Built once at startup; cheap to share behind an `Arc`.
pub struct AuthService<T, S> {
    client: Arc<BankIdClient<T>>,
    resolver: Arc<IdentityResolver<S>>,
    sessions: SessionRegistry,
    settings: PollSettings,
}

impl<T: Transport, S: UserStore> AuthService<T, S> {
    /// Create the service from a protocol client and a user store.
    #[must_use]
    pub fn new(client: BankIdClient<T>, store: S, config: &BankIdConfig) -> Self {
        Self {
            client: Arc::new(client),
            resolver: Arc::new(IdentityResolver::new(store)),
            sessions: SessionRegistry::new(config.order_ttl, config.session_retention),
            settings: PollSettings {
                interval: config.poll_interval,
                max_transport_failures: config.max_transport_failures,
            },
        }
    }

    /// The identity resolver, for callers that look users up directly.
    #[must_use]
    pub fn resolver(&self) -> &IdentityResolver<S> {
        &self.resolver
    }

    /// Start an order and its polling task.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Protocol` if the authority does not accept the order.
    #[instrument(skip(self, personal_number))]
    pub async fn initiate(
        &self,
        end_user_ip: IpAddr,
        personal_number: Option<&PersonalNumber>,
    ) -> Result<InitiatedOrder, AuthError> {
        let order = self.client.initiate(end_user_ip, personal_number).await?;

        let initiated = InitiatedOrder {
            order_ref: order.order_ref().clone(),
            start_token: order.start_token().to_owned(),
            auto_start_token: order.auto_start_token().to_owned(),
            auto_start_url: qr::autostart_url(order.auto_start_token()),
        };

        let session = Arc::new(AuthSession::new(order));
        self.sessions.insert(Arc::clone(&session)).await;
        poller::spawn(
            session,
            Arc::clone(&self.client),
            Arc::clone(&self.resolver),
            self.settings,
        );

        Ok(initiated)
    }

    /// Latest state of an order.
    ///
    /// An order this process does not track reads as `failed` with
    /// `unknown-order`.
    pub async fn collect(&self, order_ref: &OrderRef) -> SessionSnapshot {
        match self.sessions.get(order_ref).await {
            Some(session) => session.snapshot().await,
            None => SessionSnapshot {
                order_ref: order_ref.clone(),
                status: OrderStatus::Failed,
                hint_code: Some(HintCode::UnknownOrder),
                resolved_user: None,
            },
        }
    }

    /// Wait for the polling task to finish and return the final state.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownOrder` if the order is not tracked.
    pub async fn wait(&self, order_ref: &OrderRef) -> Result<SessionSnapshot, AuthError> {
        let session = self
            .sessions
            .get(order_ref)
            .await
            .ok_or(AuthError::UnknownOrder)?;
        session.wait_finished().await;
        Ok(session.snapshot().await)
    }

    /// Cancel a pending order.
    ///
    /// Cancelling an order that already settled is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownOrder` if the order is not tracked.
    #[instrument(skip(self), fields(order_ref = %order_ref))]
    pub async fn cancel(&self, order_ref: &OrderRef) -> Result<(), AuthError> {
        let session = self
            .sessions
            .get(order_ref)
            .await
            .ok_or(AuthError::UnknownOrder)?;

        match session.cancel().await {
            Ok(()) => {
                self.client.cancel(order_ref).await;
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "Cancel after settle ignored");
                Ok(())
            }
        }
    }

    /// Current animated QR payload for a pending order.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownOrder` if the order is not tracked and
    /// `AuthError::NotPending` once it has settled.
    pub async fn qr_data(&self, order_ref: &OrderRef) -> Result<String, AuthError> {
        let session = self
            .sessions
            .get(order_ref)
            .await
            .ok_or(AuthError::UnknownOrder)?;

        let order = session.order().await;
        if !order.is_pending() {
            return Err(AuthError::NotPending);
        }
        let elapsed = order.elapsed_secs(Utc::now());
        Ok(qr::animated_qr_data(
            order.start_token(),
            order.start_secret(),
            elapsed,
        )?)
    }

    /// Forget an order whose outcome has been consumed.
    pub async fn forget(&self, order_ref: &OrderRef) {
        self.sessions.remove(order_ref).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::bankid::client::tests::{ScriptedTransport, auth_json, completion_json};
    use crate::db::MemoryUserStore;

    fn service() -> (
        Arc<ScriptedTransport>,
        AuthService<Arc<ScriptedTransport>, MemoryUserStore>,
    ) {
        let transport = Arc::new(ScriptedTransport::default());
        let config = BankIdConfig::default();
        let client = BankIdClient::new(Arc::clone(&transport), config.order_ttl);
        let service = AuthService::new(client, MemoryUserStore::new(), &config);
        (transport, service)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initiate_and_complete() {
        let (transport, service) = service();
        transport.push(Ok(auth_json()));
        transport.push(Ok(json!({ "orderRef": "abc123", "status": "pending" })));
        transport.push(Ok(json!({
            "orderRef": "abc123",
            "status": "complete",
            "completionData": completion_json()
        })));

        let initiated = service
            .initiate("192.0.2.1".parse().unwrap(), None)
            .await
            .unwrap();
        assert_eq!(initiated.order_ref.as_str(), "abc123");
        assert_eq!(initiated.start_token, "tok1");
        assert_eq!(
            initiated.auto_start_url,
            "bankid:///?autostarttoken=auto1&redirect=null"
        );

        let snapshot = service.wait(&initiated.order_ref).await.unwrap();
        assert_eq!(snapshot.status, OrderStatus::Complete);
        assert_eq!(snapshot.resolved_user.unwrap().name, "Jane Doe");
        assert_eq!(
            service.collect(&initiated.order_ref).await.status,
            OrderStatus::Complete
        );
    }

    #[tokio::test]
    async fn test_collect_unknown_order() {
        let (_transport, service) = service();
        let snapshot = service.collect(&OrderRef::new("nope")).await;
        assert_eq!(snapshot.status, OrderStatus::Failed);
        assert_eq!(snapshot.hint_code, Some(HintCode::UnknownOrder));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_calls_authority_once() {
        let (transport, service) = service();
        transport.push(Ok(auth_json()));

        let initiated = service
            .initiate("192.0.2.1".parse().unwrap(), None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        service.cancel(&initiated.order_ref).await.unwrap();
        service.cancel(&initiated.order_ref).await.unwrap();

        let snapshot = service.wait(&initiated.order_ref).await.unwrap();
        assert_eq!(snapshot.status, OrderStatus::Cancelled);
        assert_eq!(transport.calls("cancel"), 1);
        assert!(matches!(
            service.qr_data(&initiated.order_ref).await,
            Err(AuthError::NotPending)
        ));
    }

    #[tokio::test]
    async fn test_qr_data_for_pending_order() {
        let (transport, service) = service();
        transport.push(Ok(auth_json()));

        let initiated = service
            .initiate("192.0.2.1".parse().unwrap(), None)
            .await
            .unwrap();
        let data = service.qr_data(&initiated.order_ref).await.unwrap();

        assert!(data.starts_with("bankid.tok1."));
        assert!(!data.contains("secret1"));
    }

    #[tokio::test]
    async fn test_cancel_unknown_order() {
        let (_transport, service) = service();
        assert!(matches!(
            service.cancel(&OrderRef::new("nope")).await,
            Err(AuthError::UnknownOrder)
        ));
    }
}
