//! Webhook payload types for settlement events.

use serde::{Deserialize, Serialize};

use super::Chain;
use crate::signature::Signature;

/// Event type tag carried by [`OrderSettledPayload`].
pub const ORDER_SETTLED_EVENT: &str = "order_settled";

/// Webhook payload sent to the merchant once an order has been paid on-chain.
///
/// Amounts are decimal strings so that no precision is lost in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSettledPayload {
    pub event_type: String,
    pub trade_id: String,
    pub order_id: String,
    pub chain: Chain,
    pub wallet_address: String,
    /// Amount the merchant requested, in the order's pricing unit.
    pub amount: String,
    /// Amount of the stablecoin actually received.
    pub actual_amount: String,
    /// Chain-native transaction identifier (hash or version).
    pub block_transaction_id: String,
    pub status: OrderStatus,
    /// Unix timestamp (seconds) at which the order was marked paid.
    pub settled_at: i64,
}

impl Signature for OrderSettledPayload {}

/// Order status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `tollgate-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Expired,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Paid => write!(f, "paid"),
            OrderStatus::Expired => write!(f, "expired"),
        }
    }
}
