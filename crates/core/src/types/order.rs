//! Authentication orders and their state machine.
//!
//! ```text
//!            ┌──────────► Complete
//!            │
//!  Pending ──┼──────────► Failed
//!            │
//!            └──────────► Cancelled
//! ```
//!
//! All right-hand states are terminal. Every mutation is guarded by "only if
//! still `Pending`": a report or cancellation that arrives after the order
//! has settled is rejected with [`TransitionError::InvalidTransition`] and
//! leaves the order untouched.

use core::fmt;

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::completion::CompletionData;
use super::hint::HintCode;

/// Opaque order identifier assigned by the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderRef(String);

impl OrderRef {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Complete,
    Failed,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by illegal state machine use.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The order has already settled.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },
}

/// Tokens handed out by the authority when an order is created.
pub struct StartTokens {
    /// Token for launching the counterpart app on the same device.
    pub auto_start_token: String,
    /// Public half of the animated QR code.
    pub start_token: String,
    /// Secret half of the animated QR code. Never leaves the server.
    pub start_secret: SecretString,
}

/// One decoded `collect` answer, already normalized by the protocol client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectReport {
    pub status: OrderStatus,
    pub hint_code: Option<HintCode>,
    pub completion: Option<CompletionData>,
}

impl CollectReport {
    #[must_use]
    pub const fn pending(hint_code: Option<HintCode>) -> Self {
        Self {
            status: OrderStatus::Pending,
            hint_code,
            completion: None,
        }
    }

    #[must_use]
    pub const fn complete(completion: CompletionData) -> Self {
        Self {
            status: OrderStatus::Complete,
            hint_code: None,
            completion: Some(completion),
        }
    }

    #[must_use]
    pub const fn failed(hint_code: HintCode) -> Self {
        Self {
            status: OrderStatus::Failed,
            hint_code: Some(hint_code),
            completion: None,
        }
    }
}

/// Outcome of applying a report to a pending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The order is still pending and should be polled again.
    StillPending,
    /// The order settled in the given terminal status.
    Settled(OrderStatus),
}

/// One in-flight or completed authentication attempt.
///
/// Fields are private so the `completion ⇔ Complete` invariant and the
/// immutability of `order_ref` cannot be bypassed.
pub struct AuthOrder {
    order_ref: OrderRef,
    auto_start_token: String,
    start_token: String,
    start_secret: SecretString,
    status: OrderStatus,
    hint_code: Option<HintCode>,
    completion: Option<CompletionData>,
    transport_failures: u32,
    created_at: DateTime<Utc>,
    last_polled_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for AuthOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOrder")
            .field("order_ref", &self.order_ref)
            .field("start_token", &self.start_token)
            .field("start_secret", &"[REDACTED]")
            .field("status", &self.status)
            .field("hint_code", &self.hint_code)
            .field("completion", &self.completion)
            .field("transport_failures", &self.transport_failures)
            .field("created_at", &self.created_at)
            .field("last_polled_at", &self.last_polled_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl AuthOrder {
    /// Create a pending order that expires `ttl` after `created_at`.
    #[must_use]
    pub fn pending(
        order_ref: OrderRef,
        tokens: StartTokens,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            order_ref,
            auto_start_token: tokens.auto_start_token,
            start_token: tokens.start_token,
            start_secret: tokens.start_secret,
            status: OrderStatus::Pending,
            hint_code: None,
            completion: None,
            transport_failures: 0,
            created_at,
            last_polled_at: None,
            expires_at: created_at + ttl,
        }
    }

    #[must_use]
    pub const fn order_ref(&self) -> &OrderRef {
        &self.order_ref
    }

    #[must_use]
    pub fn auto_start_token(&self) -> &str {
        &self.auto_start_token
    }

    #[must_use]
    pub fn start_token(&self) -> &str {
        &self.start_token
    }

    /// Only the QR renderer should ever need this.
    #[must_use]
    pub const fn start_secret(&self) -> &SecretString {
        &self.start_secret
    }

    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    #[must_use]
    pub const fn hint_code(&self) -> Option<&HintCode> {
        self.hint_code.as_ref()
    }

    #[must_use]
    pub const fn completion(&self) -> Option<&CompletionData> {
        self.completion.as_ref()
    }

    #[must_use]
    pub const fn transport_failures(&self) -> u32 {
        self.transport_failures
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn last_polled_at(&self) -> Option<DateTime<Utc>> {
        self.last_polled_at
    }

    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, OrderStatus::Pending)
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whole seconds since the order was created, as used by the animated QR code.
    #[must_use]
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.created_at).num_seconds()).unwrap_or(0)
    }

    /// Fail a pending order whose absolute expiry has passed.
    ///
    /// Returns `true` if this call moved the order to `Failed(expired)`.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_pending() || !self.is_expired_at(now) {
            return false;
        }
        self.settle(OrderStatus::Failed, Some(HintCode::Expired), None);
        true
    }

    /// Apply one collect report, in the order reports were received.
    ///
    /// A transient transport failure keeps the order pending until
    /// `max_transport_failures` consecutive failures have been seen.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::InvalidTransition` if the order has already
    /// settled. The order is left untouched in that case.
    pub fn apply(
        &mut self,
        report: CollectReport,
        now: DateTime<Utc>,
        max_transport_failures: u32,
    ) -> Result<Applied, TransitionError> {
        self.ensure_pending(report.status)?;
        self.last_polled_at = Some(now);

        match report.status {
            OrderStatus::Pending => {
                self.transport_failures = 0;
                self.hint_code = report.hint_code;
                Ok(Applied::StillPending)
            }
            OrderStatus::Complete => match report.completion {
                Some(completion) => {
                    self.settle(OrderStatus::Complete, None, Some(completion));
                    Ok(Applied::Settled(OrderStatus::Complete))
                }
                None => {
                    self.settle(
                        OrderStatus::Failed,
                        Some(HintCode::MalformedResponse),
                        None,
                    );
                    Ok(Applied::Settled(OrderStatus::Failed))
                }
            },
            OrderStatus::Failed | OrderStatus::Cancelled => {
                let hint = report.hint_code.unwrap_or(HintCode::Cancelled);
                if hint.is_transient() {
                    self.transport_failures = self.transport_failures.saturating_add(1);
                    if self.transport_failures < max_transport_failures {
                        return Ok(Applied::StillPending);
                    }
                }
                self.settle(OrderStatus::Failed, Some(hint), None);
                Ok(Applied::Settled(OrderStatus::Failed))
            }
        }
    }

    /// Cancel a pending order at the caller's request.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::InvalidTransition` if the order has already
    /// settled.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.ensure_pending(OrderStatus::Cancelled)?;
        self.settle(OrderStatus::Cancelled, Some(HintCode::Cancelled), None);
        Ok(())
    }

    const fn ensure_pending(&self, to: OrderStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn settle(
        &mut self,
        status: OrderStatus,
        hint_code: Option<HintCode>,
        completion: Option<CompletionData>,
    ) {
        debug_assert_eq!(
            completion.is_some(),
            status == OrderStatus::Complete,
            "completion must accompany Complete and nothing else"
        );
        self.status = status;
        self.hint_code = hint_code;
        self.completion = completion;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::types::completion::{CertValidity, Device, VerifiedUser};
    use crate::types::personal_number::PersonalNumber;

    fn order_at(created_at: DateTime<Utc>) -> AuthOrder {
        AuthOrder::pending(
            OrderRef::new("abc123"),
            StartTokens {
                auto_start_token: "auto1".to_owned(),
                start_token: "tok1".to_owned(),
                start_secret: SecretString::from("qr-secret"),
            },
            created_at,
            Duration::seconds(180),
        )
    }

    fn order() -> AuthOrder {
        order_at(Utc::now())
    }

    fn completion() -> CompletionData {
        CompletionData {
            user: VerifiedUser {
                personal_number: PersonalNumber::parse("198001011234").unwrap(),
                name: "Jane Doe".to_owned(),
                given_name: "Jane".to_owned(),
                surname: "Doe".to_owned(),
            },
            device: Device {
                ip_address: "192.0.2.10".to_owned(),
                uhi: None,
            },
            cert: CertValidity {
                not_before: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
                not_after: DateTime::from_timestamp_millis(1_800_000_000_000).unwrap(),
            },
            signature: "sig".to_owned(),
            ocsp_response: "ocsp".to_owned(),
        }
    }

    #[test]
    fn test_new_order_is_pending() {
        let order = order();
        assert!(order.is_pending());
        assert!(order.completion().is_none());
        assert!(order.last_polled_at().is_none());
        assert_eq!(order.order_ref().as_str(), "abc123");
    }

    #[test]
    fn test_pending_report_updates_hint_and_poll_time() {
        let mut order = order();
        let now = Utc::now();
        let applied = order
            .apply(
                CollectReport::pending(Some(HintCode::OutstandingTransaction)),
                now,
                3,
            )
            .unwrap();
        assert_eq!(applied, Applied::StillPending);
        assert_eq!(order.hint_code(), Some(&HintCode::OutstandingTransaction));
        assert_eq!(order.last_polled_at(), Some(now));
    }

    #[test]
    fn test_complete_report_settles_with_completion() {
        let mut order = order();
        let applied = order
            .apply(CollectReport::complete(completion()), Utc::now(), 3)
            .unwrap();
        assert_eq!(applied, Applied::Settled(OrderStatus::Complete));
        assert_eq!(
            order.completion().unwrap().user.personal_number.as_str(),
            "198001011234"
        );
    }

    #[test]
    fn test_complete_without_payload_is_malformed() {
        let mut order = order();
        let report = CollectReport {
            status: OrderStatus::Complete,
            hint_code: None,
            completion: None,
        };
        let applied = order.apply(report, Utc::now(), 3).unwrap();
        assert_eq!(applied, Applied::Settled(OrderStatus::Failed));
        assert_eq!(order.hint_code(), Some(&HintCode::MalformedResponse));
        assert!(order.completion().is_none());
    }

    #[test]
    fn test_transport_failures_are_bounded() {
        let mut order = order();
        let now = Utc::now();
        for _ in 0..2 {
            let applied = order
                .apply(CollectReport::failed(HintCode::NetworkError), now, 3)
                .unwrap();
            assert_eq!(applied, Applied::StillPending);
        }
        assert_eq!(order.transport_failures(), 2);

        let applied = order
            .apply(CollectReport::failed(HintCode::NetworkError), now, 3)
            .unwrap();
        assert_eq!(applied, Applied::Settled(OrderStatus::Failed));
        assert_eq!(order.hint_code(), Some(&HintCode::NetworkError));
    }

    #[test]
    fn test_pending_report_resets_transport_failures() {
        let mut order = order();
        let now = Utc::now();
        order
            .apply(CollectReport::failed(HintCode::NetworkError), now, 3)
            .unwrap();
        order.apply(CollectReport::pending(None), now, 3).unwrap();
        assert_eq!(order.transport_failures(), 0);
    }

    #[test]
    fn test_protocol_failure_is_terminal_immediately() {
        let mut order = order();
        let applied = order
            .apply(CollectReport::failed(HintCode::UnknownOrder), Utc::now(), 3)
            .unwrap();
        assert_eq!(applied, Applied::Settled(OrderStatus::Failed));
        assert_eq!(order.hint_code(), Some(&HintCode::UnknownOrder));
    }

    #[test]
    fn test_expiry() {
        let created = Utc::now() - Duration::seconds(600);
        let mut order = order_at(created);
        assert!(order.expire_if_due(Utc::now()));
        assert_eq!(order.status(), OrderStatus::Failed);
        assert_eq!(order.hint_code(), Some(&HintCode::Expired));
        // Already settled: a second check is a no-op.
        assert!(!order.expire_if_due(Utc::now()));
    }

    #[test]
    fn test_not_expired_yet() {
        let mut order = order();
        assert!(!order.expire_if_due(Utc::now()));
        assert!(order.is_pending());
    }

    #[test]
    fn test_cancel_then_complete_is_discarded() {
        let mut order = order();
        order.cancel().unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);

        let err = order
            .apply(CollectReport::complete(completion()), Utc::now(), 3)
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Complete,
            }
        );
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(order.completion().is_none());
    }

    #[test]
    fn test_cancel_after_complete_is_rejected() {
        let mut order = order();
        order
            .apply(CollectReport::complete(completion()), Utc::now(), 3)
            .unwrap();
        assert!(order.cancel().is_err());
        assert_eq!(order.status(), OrderStatus::Complete);
    }

    #[test]
    fn test_elapsed_secs() {
        let created = Utc::now();
        let order = order_at(created);
        assert_eq!(order.elapsed_secs(created + Duration::seconds(7)), 7);
        assert_eq!(order.elapsed_secs(created - Duration::seconds(7)), 0);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", order());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("qr-secret"));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Pending,
        Complete,
        CompleteWithoutPayload,
        NetworkError,
        Failed,
        Cancel,
        Expire,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Pending),
            Just(Step::Complete),
            Just(Step::CompleteWithoutPayload),
            Just(Step::NetworkError),
            Just(Step::Failed),
            Just(Step::Cancel),
            Just(Step::Expire),
        ]
    }

    fn report_for(step: &Step) -> CollectReport {
        match step {
            Step::Complete => CollectReport::complete(completion()),
            Step::CompleteWithoutPayload => CollectReport {
                status: OrderStatus::Complete,
                hint_code: None,
                completion: None,
            },
            Step::NetworkError => CollectReport::failed(HintCode::NetworkError),
            Step::Failed => CollectReport::failed(HintCode::UserCancel),
            Step::Pending | Step::Cancel | Step::Expire => CollectReport::pending(None),
        }
    }

    proptest! {
        #[test]
        fn prop_completion_iff_complete(steps in prop::collection::vec(step(), 0..24)) {
            let created = Utc::now();
            let mut order = order_at(created);
            let mut settled: Option<OrderStatus> = None;

            for step in steps {
                let now = created + Duration::seconds(1);
                let result = match &step {
                    Step::Cancel => order.cancel(),
                    Step::Expire => {
                        order.expire_if_due(created + Duration::seconds(3600));
                        Ok(())
                    }
                    other => order.apply(report_for(other), now, 3).map(|_| ()),
                };

                // Once settled, nothing moves the order and every attempt errs.
                if let Some(status) = settled {
                    prop_assert_eq!(order.status(), status);
                    if !matches!(step, Step::Expire) {
                        prop_assert!(result.is_err());
                    }
                } else if order.status().is_terminal() {
                    settled = Some(order.status());
                }

                prop_assert_eq!(
                    order.completion().is_some(),
                    order.status() == OrderStatus::Complete
                );
            }
        }
    }
}
