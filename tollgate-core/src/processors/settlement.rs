//! Settling matched orders.
//!
//! A settlement is the pending → paid transition of one order, committed
//! together with its webhook job, followed by one operator notification. The
//! order store guarantees the transition happens once per trade id, so the
//! notification only follows an `Applied` transition. If the webhook cannot
//! be queued the order stays pending and a later scan settles it again.

use crate::entities::OrderStatus;
use crate::entities::dispatch_jobs::NewDispatchJob;
use crate::entities::order_records::OrderRecord;
use crate::notifier::{Notifier, format_settlement_message};
use crate::sources::DepositEvent;
use crate::stores::{OrderStore, StoreError, Transition};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tollgate_sdk::objects::{ORDER_SETTLED_EVENT, OrderSettledPayload};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// This call moved the order to paid.
    Settled,
    /// The order was already paid; nothing was done.
    AlreadySettled,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("order is {0:?} and cannot be paid")]
    NotPending(OrderStatus),

    #[error("order not found")]
    NotFound,
}

pub struct SettlementCoordinator {
    orders: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
    max_retry: u32,
}

impl SettlementCoordinator {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        notifier: Arc<dyn Notifier>,
        max_retry: u32,
    ) -> Self {
        Self {
            orders,
            notifier,
            max_retry,
        }
    }

    /// Mark `order` paid by `event`, queue its webhook and notify.
    pub async fn settle(
        &self,
        order: &OrderRecord,
        event: &DepositEvent,
    ) -> Result<SettlementOutcome, SettlementError> {
        let settled_at = OffsetDateTime::now_utc();
        let webhook = NewDispatchJob::new(
            settlement_payload(order, &event.external_tx_id, settled_at),
            order.notify_url.clone(),
            self.max_retry,
        );
        let job_id = webhook.id;

        let settled = match self
            .orders
            .mark_paid(&order.trade_id, &event.external_tx_id, settled_at, webhook)
            .await?
        {
            Transition::Applied(settled) => settled,
            Transition::AlreadySettled => {
                debug!(trade_id = %order.trade_id, "Order already settled");
                return Ok(SettlementOutcome::AlreadySettled);
            }
            Transition::NotPending(status) => return Err(SettlementError::NotPending(status)),
            Transition::NotFound => return Err(SettlementError::NotFound),
        };

        info!(
            trade_id = %settled.trade_id,
            order_id = %settled.order_id,
            chain = %settled.chain,
            tx_id = %event.external_tx_id,
            amount = %settled.actual_amount,
            job_id = %job_id,
            "Order settled"
        );

        self.notifier
            .notify(format_settlement_message(&settled, event, settled_at));

        Ok(SettlementOutcome::Settled)
    }
}

fn settlement_payload(
    order: &OrderRecord,
    block_transaction_id: &str,
    settled_at: OffsetDateTime,
) -> OrderSettledPayload {
    OrderSettledPayload {
        event_type: ORDER_SETTLED_EVENT.to_string(),
        trade_id: order.trade_id.clone(),
        order_id: order.order_id.clone(),
        chain: order.chain.into(),
        wallet_address: order.wallet_address.clone(),
        amount: order.amount.to_string(),
        actual_amount: order.actual_amount.to_string(),
        block_transaction_id: block_transaction_id.to_string(),
        status: OrderStatus::Paid.into(),
        settled_at: settled_at.unix_timestamp(),
    }
}
