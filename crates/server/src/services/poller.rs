//! Per-order polling task.
//!
//! One task per session. Each tick it checks expiry, calls `collect` with the
//! order lock released, then re-takes the lock and applies the report only if
//! the order is still pending and not yet past its deadline. Cancellation
//! wakes the task between ticks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, info_span, warn};

use bankid_gateway_core::{Applied, OrderStatus};

use super::identity::IdentityResolver;
use super::sessions::{AuthSession, Resolution};
use crate::bankid::{BankIdClient, Transport};
use crate::db::UserStore;

/// Timing knobs for the polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_transport_failures: u32,
}

/// Spawn the polling task for `session`.
pub fn spawn<T: Transport, S: UserStore>(
    session: Arc<AuthSession>,
    client: Arc<BankIdClient<T>>,
    resolver: Arc<IdentityResolver<S>>,
    settings: PollSettings,
) -> tokio::task::JoinHandle<()> {
    let span = info_span!("poll_order", order_ref = %session.order_ref());
    tokio::spawn(drive(session, client, resolver, settings).instrument(span))
}

/// Poll until the order settles, then resolve its user if it completed.
pub async fn drive<T: Transport, S: UserStore>(
    session: Arc<AuthSession>,
    client: Arc<BankIdClient<T>>,
    resolver: Arc<IdentityResolver<S>>,
    settings: PollSettings,
) {
    let settled = poll_until_settled(&session, &client, settings).await;

    if settled == Some(OrderStatus::Complete) {
        resolve(&session, &resolver).await;
    }

    session.finish();
}

async fn poll_until_settled<T: Transport>(
    session: &AuthSession,
    client: &BankIdClient<T>,
    settings: PollSettings,
) -> Option<OrderStatus> {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = session.cancelled() => {
                debug!("Polling stopped by cancellation");
                return Some(OrderStatus::Cancelled);
            }
        }

        {
            let mut order = session.order().await;
            if !order.is_pending() {
                return Some(order.status());
            }
            if order.expire_if_due(Utc::now()) {
                info!("Order expired before completion");
                return Some(OrderStatus::Failed);
            }
        }

        let report = client.collect(session.order_ref()).await;

        let mut order = session.order().await;
        if !order.is_pending() {
            debug!(status = %order.status(), "Discarding report for settled order");
            return Some(order.status());
        }
        if order.expire_if_due(Utc::now()) {
            info!("Order expired while collect was in flight, report discarded");
            return Some(OrderStatus::Failed);
        }

        match order.apply(report, Utc::now(), settings.max_transport_failures) {
            Ok(Applied::StillPending) => {
                if order.transport_failures() > 0 {
                    warn!(
                        failures = order.transport_failures(),
                        "Transient collect failure, will retry"
                    );
                }
            }
            Ok(Applied::Settled(status)) => {
                info!(status = %status, hint = ?order.hint_code(), "Order settled");
                return Some(status);
            }
            Err(e) => {
                // unreachable: is_pending was checked under the same lock
                error!(error = %e, "Invalid order transition");
                return None;
            }
        }
    }
}

async fn resolve<S: UserStore>(session: &AuthSession, resolver: &IdentityResolver<S>) {
    let completion = session.order().await.completion().cloned();
    let Some(completion) = completion else {
        error!("Complete order without completion data");
        session.set_resolution(Resolution::Failed);
        return;
    };

    match resolver.resolve(&completion).await {
        Ok(user) => {
            info!(user_id = %user.id, "Order resolved to local user");
            session.set_resolution(Resolution::Resolved(user));
        }
        Err(e) => {
            error!(error = %e, "Identity resolution failed");
            session.set_resolution(Resolution::Failed);
        }
    }
}
