//! Matching deposit events to pending orders.

use crate::config::ChainConfig;
use crate::entities::order_records::OrderRecord;
use crate::sources::DepositEvent;
use crate::stores::{OrderStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Which filter rejected an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// The transaction did not succeed on-chain.
    Failed,
    /// The event moved a different asset.
    AssetMismatch,
    /// The transfer type is not an incoming deposit.
    NotDeposit,
    /// The event credited another address.
    RecipientMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Rejected by an event filter before any store lookup.
    Filtered(FilterReason),
    /// No pending order waits for this wallet and amount.
    NoOrder,
    /// An order matched but was created after the deposit was observed.
    NonCausal { trade_id: String },
    Matched(OrderRecord),
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("order lookup failed: {0}")]
    Lookup(#[from] StoreError),

    /// More than one pending order expects the same amount on one wallet.
    #[error("{count} pending orders share this wallet and amount")]
    Ambiguous { count: usize },
}

/// Per-chain filter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRules {
    /// Asset identifier a deposit must carry, compared case-insensitively.
    pub target_asset: String,
    /// Substring a transfer type must contain, compared case-insensitively.
    pub deposit_marker: String,
}

impl MatchRules {
    pub fn from_config(config: &ChainConfig) -> Self {
        Self {
            target_asset: config.asset.asset_type.clone(),
            deposit_marker: config.deposit_marker.clone(),
        }
    }
}

pub struct Matcher {
    orders: Arc<dyn OrderStore>,
    rules: MatchRules,
}

impl Matcher {
    pub fn new(orders: Arc<dyn OrderStore>, rules: MatchRules) -> Self {
        let rules = MatchRules {
            target_asset: rules.target_asset,
            deposit_marker: rules.deposit_marker.to_lowercase(),
        };
        Self { orders, rules }
    }

    /// Apply the event filters in order, returning the first that fails.
    pub fn filter(&self, event: &DepositEvent, wallet: &str) -> Option<FilterReason> {
        if !event.success {
            return Some(FilterReason::Failed);
        }
        if !event.asset_type.eq_ignore_ascii_case(&self.rules.target_asset) {
            return Some(FilterReason::AssetMismatch);
        }
        if !event
            .transfer_type
            .to_lowercase()
            .contains(&self.rules.deposit_marker)
        {
            return Some(FilterReason::NotDeposit);
        }
        if !event.recipient_address.eq_ignore_ascii_case(wallet) {
            return Some(FilterReason::RecipientMismatch);
        }
        None
    }

    /// Find the pending order `event` pays for, if any.
    pub async fn find_match(
        &self,
        event: &DepositEvent,
        wallet: &str,
    ) -> Result<MatchOutcome, MatchError> {
        if let Some(reason) = self.filter(event, wallet) {
            return Ok(MatchOutcome::Filtered(reason));
        }

        let trade_ids = self
            .orders
            .pending_trade_ids(event.chain, wallet, event.amount)
            .await?;
        let trade_id = match trade_ids.as_slice() {
            [] => return Ok(MatchOutcome::NoOrder),
            [only] => only,
            _ => {
                return Err(MatchError::Ambiguous {
                    count: trade_ids.len(),
                });
            }
        };

        let Some(order) = self.orders.order_by_trade_id(trade_id).await? else {
            debug!(trade_id, "Pending order disappeared before it could be loaded");
            return Ok(MatchOutcome::NoOrder);
        };

        if event.observed_at_ms < order.created_at_millis() {
            warn!(
                trade_id = %order.trade_id,
                tx_id = %event.external_tx_id,
                observed_at_ms = event.observed_at_ms,
                created_at_ms = order.created_at_millis(),
                "Deposit predates the order; not matching"
            );
            return Ok(MatchOutcome::NonCausal {
                trade_id: order.trade_id,
            });
        }

        Ok(MatchOutcome::Matched(order))
    }
}
