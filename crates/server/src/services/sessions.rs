//! Live authentication sessions.
//!
//! An [`AuthSession`] owns one [`AuthOrder`] plus what happened after it
//! settled. The order sits behind an async mutex: whoever takes the lock
//! first while the order is still pending gets to move it, everyone else
//! finds it settled and backs off.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::{Notify, watch};

use bankid_gateway_core::{AuthOrder, HintCode, OrderRef, OrderStatus, TransitionError};

use crate::models::user::LocalUser;

/// What became of a completed order on the local side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Not resolved yet, or the order never completed.
    Unresolved,
    /// The order's identity maps to this user.
    Resolved(LocalUser),
    /// The identity could not be mapped to a user.
    Failed,
}

/// Point-in-time view of a session, safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub order_ref: OrderRef,
    pub status: OrderStatus,
    pub hint_code: Option<HintCode>,
    pub resolved_user: Option<LocalUser>,
}

/// One authentication attempt and its polling state.
pub struct AuthSession {
    order_ref: OrderRef,
    order: tokio::sync::Mutex<AuthOrder>,
    resolution: Mutex<Resolution>,
    cancel: Notify,
    finished: watch::Sender<bool>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("order_ref", &self.order_ref)
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Wrap a freshly initiated order.
    #[must_use]
    pub fn new(order: AuthOrder) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            order_ref: order.order_ref().clone(),
            order: tokio::sync::Mutex::new(order),
            resolution: Mutex::new(Resolution::Unresolved),
            cancel: Notify::new(),
            finished,
        }
    }

    #[must_use]
    pub const fn order_ref(&self) -> &OrderRef {
        &self.order_ref
    }

    /// Exclusive access to the order. Never hold it across a network call.
    pub async fn order(&self) -> tokio::sync::MutexGuard<'_, AuthOrder> {
        self.order.lock().await
    }

    /// Cancel the order if it is still pending and wake the poller.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::InvalidTransition` if the order already settled.
    pub async fn cancel(&self) -> Result<(), TransitionError> {
        self.order.lock().await.cancel()?;
        self.cancel.notify_one();
        Ok(())
    }

    /// Resolves once [`AuthSession::cancel`] has been called.
    pub async fn cancelled(&self) {
        self.cancel.notified().await;
    }

    pub fn set_resolution(&self, resolution: Resolution) {
        let mut slot = self.resolution.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = resolution;
    }

    #[must_use]
    pub fn resolution(&self) -> Resolution {
        self.resolution
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mark the session as done: no more polling, resolution final.
    pub fn finish(&self) {
        self.finished.send_replace(true);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// Wait until the poller has stopped for good.
    pub async fn wait_finished(&self) {
        let mut rx = self.finished.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Current caller-facing state.
    ///
    /// A completed order reads as pending until its user is resolved, so
    /// `complete` always arrives together with `resolved_user`.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let (status, hint_code) = {
            let order = self.order.lock().await;
            (order.status(), order.hint_code().cloned())
        };

        let (status, hint_code, resolved_user) = match (status, self.resolution()) {
            (OrderStatus::Complete, Resolution::Resolved(user)) => {
                (OrderStatus::Complete, None, Some(user))
            }
            (OrderStatus::Complete, Resolution::Failed) => {
                (OrderStatus::Failed, Some(HintCode::ResolutionFailed), None)
            }
            (OrderStatus::Complete, Resolution::Unresolved) => (OrderStatus::Pending, None, None),
            (other, _) => (other, hint_code, None),
        };

        SessionSnapshot {
            order_ref: self.order_ref.clone(),
            status,
            hint_code,
            resolved_user,
        }
    }
}

/// All sessions this process is tracking, keyed by order reference.
///
/// Entries expire a fixed time after insertion, long enough to outlive the
/// order itself plus a grace period in which callers can still read the
/// outcome.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Cache<OrderRef, Arc<AuthSession>>,
}

impl SessionRegistry {
    /// Create a registry whose entries live for `order_ttl + retention`.
    #[must_use]
    pub fn new(order_ttl: Duration, retention: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(order_ttl.saturating_add(retention))
            .build();
        Self { sessions }
    }

    pub async fn insert(&self, session: Arc<AuthSession>) {
        self.sessions
            .insert(session.order_ref().clone(), session)
            .await;
    }

    pub async fn get(&self, order_ref: &OrderRef) -> Option<Arc<AuthSession>> {
        self.sessions.get(order_ref).await
    }

    /// Forget a session, e.g. once its outcome has been consumed.
    pub async fn remove(&self, order_ref: &OrderRef) {
        self.sessions.invalidate(order_ref).await;
    }
}
