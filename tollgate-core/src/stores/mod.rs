//! Persistence seams used by the reconciliation core.
//!
//! The scanner only talks to orders, wallets and the dispatch queue through
//! these traits. [`postgres::PgStore`] implements all of them on top of the
//! `entities` queries.

pub mod postgres;

use crate::entities::ChainName;
use crate::entities::dispatch_jobs::{DispatchJobRecord, NewDispatchJob};
use crate::entities::order_records::OrderRecord;
use crate::entities::OrderStatus;
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a store.
///
/// "Not found" is never an error: lookups return `Option` or empty vectors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store cannot be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of asking the order store to mark an order paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The order moved from pending to paid; carries the updated record.
    Applied(OrderRecord),
    /// The order was already paid. Settling it again is a no-op.
    AlreadySettled,
    /// The order is in another terminal state and cannot be paid.
    NotPending(OrderStatus),
    /// No order with this trade id exists.
    NotFound,
}

/// Order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Load an order by trade id.
    async fn order_by_trade_id(&self, trade_id: &str) -> Result<Option<OrderRecord>, StoreError>;

    /// Trade ids of pending orders on `wallet` expecting exactly `amount`.
    async fn pending_trade_ids(
        &self,
        chain: ChainName,
        wallet: &str,
        amount: Decimal,
    ) -> Result<Vec<String>, StoreError>;

    /// Move an order from pending to paid and enqueue its settlement webhook
    /// atomically: either the order is paid and `webhook` is queued, or
    /// neither happens.
    ///
    /// Must be safe to call concurrently for the same trade id: exactly one
    /// caller observes `Applied`. `webhook` is dropped for every other
    /// transition.
    async fn mark_paid(
        &self,
        trade_id: &str,
        block_transaction_id: &str,
        paid_at: time::OffsetDateTime,
        webhook: NewDispatchJob,
    ) -> Result<Transition, StoreError>;
}

/// Wallet pool.
#[async_trait]
pub trait WalletPool: Send + Sync {
    /// Addresses on `chain` currently assigned to unsettled orders.
    async fn locked_wallets(&self, chain: ChainName) -> Result<Vec<String>, StoreError>;
}

/// Durable queue of settlement webhooks.
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Enqueue a job for delivery outside of a settlement, e.g. to notify a
    /// merchant again.
    async fn enqueue(&self, job: NewDispatchJob) -> Result<(), StoreError>;

    /// Claim up to `limit` jobs whose next attempt is due.
    async fn claim_due(&self, limit: u32) -> Result<Vec<DispatchJobRecord>, StoreError>;

    /// Mark a job as delivered.
    async fn mark_delivered(&self, id: Uuid) -> Result<(), StoreError>;

    /// Record a failed attempt and schedule the next one.
    async fn reschedule(
        &self,
        id: Uuid,
        attempts: u32,
        next_attempt_at: time::OffsetDateTime,
        error: String,
    ) -> Result<(), StoreError>;

    /// Stop retrying a job.
    async fn bury(&self, id: Uuid, attempts: u32, error: String) -> Result<(), StoreError>;
}
