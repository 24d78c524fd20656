use crate::entities::{ChainName, OrderStatus};
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;

/// A merchant payment order, created upstream and settled by this core.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderRecord {
    pub trade_id: String,
    pub order_id: String,
    pub chain: ChainName,
    pub wallet_address: String,
    /// Amount requested by the merchant, in the order's pricing unit.
    pub amount: Decimal,
    /// Stablecoin amount the customer is expected to send.
    pub actual_amount: Decimal,
    pub notify_url: String,
    pub status: OrderStatus,
    pub block_transaction_id: Option<String>,
    pub created_at: time::OffsetDateTime,
    pub paid_at: Option<time::OffsetDateTime>,
}

impl OrderRecord {
    /// Creation time in UTC milliseconds, comparable to deposit timestamps.
    pub fn created_at_millis(&self) -> i64 {
        (self.created_at.unix_timestamp_nanos() / 1_000_000) as i64
    }
}

#[derive(Debug, Clone)]
/// Get one order by its trade id.
pub struct GetOrderByTradeId {
    pub trade_id: String,
}

impl Processor<GetOrderByTradeId> for DatabaseProcessor {
    type Output = Option<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderByTradeId")]
    async fn process(&self, query: GetOrderByTradeId) -> Result<Option<OrderRecord>, sqlx::Error> {
        let order = sqlx::query_as!(
            OrderRecord,
            r#"
            SELECT
                trade_id,
                order_id,
                chain as "chain!: ChainName",
                wallet_address,
                amount,
                actual_amount,
                notify_url,
                status as "status!: OrderStatus",
                block_transaction_id,
                created_at,
                paid_at
            FROM orders
            WHERE trade_id = $1
            "#,
            query.trade_id,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }
}

#[derive(Debug, Clone)]
/// Find the trade ids of pending orders waiting for `actual_amount` on a wallet.
///
/// Wallet addresses are compared case-insensitively. More than one row means
/// the wallet/amount pair is ambiguous; callers must not pick one.
pub struct GetPendingTradeIdsByWalletAmount {
    pub chain: ChainName,
    pub wallet_address: String,
    pub actual_amount: Decimal,
}

impl Processor<GetPendingTradeIdsByWalletAmount> for DatabaseProcessor {
    type Output = Vec<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPendingTradeIdsByWalletAmount")]
    async fn process(
        &self,
        query: GetPendingTradeIdsByWalletAmount,
    ) -> Result<Vec<String>, sqlx::Error> {
        let trade_ids = sqlx::query_scalar!(
            r#"
            SELECT trade_id
            FROM orders
            WHERE chain = $1
              AND lower(wallet_address) = lower($2)
              AND actual_amount = $3
              AND status = 'pending'
            ORDER BY created_at DESC
            "#,
            query.chain as ChainName,
            query.wallet_address,
            query.actual_amount,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(trade_ids)
    }
}

#[derive(Debug, Clone)]
/// Transition a pending order to paid, recording the chain transaction.
///
/// Returns the updated row, or `None` if the order was not pending (already
/// paid, expired, or missing). The `status = 'pending'` predicate makes the
/// transition happen at most once under concurrent callers.
pub struct MarkOrderPaid {
    pub trade_id: String,
    pub block_transaction_id: String,
    pub paid_at: time::OffsetDateTime,
}

impl MarkOrderPaid {
    /// Run the update on `executor`, typically a settlement transaction.
    #[tracing::instrument(skip_all, err, name = "SQL:MarkOrderPaid")]
    pub async fn execute<'e>(
        self,
        executor: impl sqlx::PgExecutor<'e>,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        let order = sqlx::query_as!(
            OrderRecord,
            r#"
            UPDATE orders
            SET status = 'paid', block_transaction_id = $2, paid_at = $3
            WHERE trade_id = $1 AND status = 'pending'
            RETURNING
                trade_id,
                order_id,
                chain as "chain!: ChainName",
                wallet_address,
                amount,
                actual_amount,
                notify_url,
                status as "status!: OrderStatus",
                block_transaction_id,
                created_at,
                paid_at
            "#,
            self.trade_id,
            self.block_transaction_id,
            self.paid_at,
        )
        .fetch_optional(executor)
        .await?;
        Ok(order)
    }
}

#[derive(Debug, Clone)]
/// Read only the status of an order.
pub struct GetOrderStatus {
    pub trade_id: String,
}

impl Processor<GetOrderStatus> for DatabaseProcessor {
    type Output = Option<OrderStatus>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderStatus")]
    async fn process(&self, query: GetOrderStatus) -> Result<Option<OrderStatus>, sqlx::Error> {
        let status = sqlx::query_scalar!(
            r#"SELECT status as "status!: OrderStatus" FROM orders WHERE trade_id = $1"#,
            query.trade_id,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }
}
