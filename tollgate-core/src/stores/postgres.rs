//! Postgres-backed stores.

use super::{DispatchQueue, OrderStore, StoreError, Transition, WalletPool};
use crate::entities::dispatch_jobs::{
    BuryDispatchJob, ClaimDueDispatchJobs, DispatchJobRecord, MarkDispatchDelivered,
    NewDispatchJob, RescheduleDispatchJob,
};
use crate::entities::order_records::{
    GetOrderByTradeId, GetOrderStatus, GetPendingTradeIdsByWalletAmount, MarkOrderPaid,
    OrderRecord,
};
use crate::entities::wallet_addresses::ListLockedWallets;
use crate::entities::{ChainName, OrderStatus};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

/// Order, wallet and dispatch store over one Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    db: DatabaseProcessor,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor::new(pool),
        }
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn order_by_trade_id(&self, trade_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        let order = self
            .db
            .process(GetOrderByTradeId {
                trade_id: trade_id.to_string(),
            })
            .await?;
        Ok(order)
    }

    async fn pending_trade_ids(
        &self,
        chain: ChainName,
        wallet: &str,
        amount: Decimal,
    ) -> Result<Vec<String>, StoreError> {
        let trade_ids = self
            .db
            .process(GetPendingTradeIdsByWalletAmount {
                chain,
                wallet_address: wallet.to_string(),
                actual_amount: amount,
            })
            .await?;
        Ok(trade_ids)
    }

    async fn mark_paid(
        &self,
        trade_id: &str,
        block_transaction_id: &str,
        paid_at: time::OffsetDateTime,
        webhook: NewDispatchJob,
    ) -> Result<Transition, StoreError> {
        let mut tx = self.db.pool.begin().await?;

        let updated = MarkOrderPaid {
            trade_id: trade_id.to_string(),
            block_transaction_id: block_transaction_id.to_string(),
            paid_at,
        }
        .execute(&mut *tx)
        .await?;

        let Some(order) = updated else {
            tx.rollback().await?;
            // The conditional update matched nothing; find out why.
            let status = self
                .db
                .process(GetOrderStatus {
                    trade_id: trade_id.to_string(),
                })
                .await?;
            return Ok(match status {
                Some(OrderStatus::Paid) => Transition::AlreadySettled,
                Some(other) => Transition::NotPending(other),
                None => Transition::NotFound,
            });
        };

        // Dropping the transaction on error rolls the order back to pending.
        webhook.insert(&mut *tx).await?;
        tx.commit().await?;
        Ok(Transition::Applied(order))
    }
}

#[async_trait]
impl WalletPool for PgStore {
    async fn locked_wallets(&self, chain: ChainName) -> Result<Vec<String>, StoreError> {
        let wallets = self.db.process(ListLockedWallets { chain }).await?;
        Ok(wallets)
    }
}

#[async_trait]
impl DispatchQueue for PgStore {
    async fn enqueue(&self, job: NewDispatchJob) -> Result<(), StoreError> {
        self.db.process(job).await?;
        Ok(())
    }

    async fn claim_due(&self, limit: u32) -> Result<Vec<DispatchJobRecord>, StoreError> {
        let jobs = self.db.process(ClaimDueDispatchJobs { limit }).await?;
        Ok(jobs)
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<(), StoreError> {
        self.db.process(MarkDispatchDelivered { id }).await?;
        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        attempts: u32,
        next_attempt_at: time::OffsetDateTime,
        error: String,
    ) -> Result<(), StoreError> {
        self.db
            .process(RescheduleDispatchJob {
                id,
                attempts,
                next_attempt_at,
                error,
            })
            .await?;
        Ok(())
    }

    async fn bury(&self, id: Uuid, attempts: u32, error: String) -> Result<(), StoreError> {
        self.db
            .process(BuryDispatchJob {
                id,
                attempts,
                error,
            })
            .await?;
        Ok(())
    }
}
