pub mod dispatch_jobs;
pub mod order_records;
pub mod wallet_addresses;

use tollgate_sdk::objects::{Chain as SdkChain, OrderStatus as SdkOrderStatus};

/// Chain name for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `tollgate_sdk::objects::Chain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "chain_name")]
pub enum ChainName {
    Tron,
    Polygon,
    Aptos,
}

impl From<ChainName> for SdkChain {
    fn from(value: ChainName) -> Self {
        match value {
            ChainName::Tron => SdkChain::Tron,
            ChainName::Polygon => SdkChain::Polygon,
            ChainName::Aptos => SdkChain::Aptos,
        }
    }
}

impl From<SdkChain> for ChainName {
    fn from(value: SdkChain) -> Self {
        match value {
            SdkChain::Tron => ChainName::Tron,
            SdkChain::Polygon => ChainName::Polygon,
            SdkChain::Aptos => ChainName::Aptos,
        }
    }
}

impl std::fmt::Display for ChainName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkChain::from(*self).fmt(f)
    }
}

/// Order status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `tollgate_sdk::objects::OrderStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "order_status")]
pub enum OrderStatus {
    Pending,
    Paid,
    Expired,
}

impl From<OrderStatus> for SdkOrderStatus {
    fn from(value: OrderStatus) -> Self {
        match value {
            OrderStatus::Pending => SdkOrderStatus::Pending,
            OrderStatus::Paid => SdkOrderStatus::Paid,
            OrderStatus::Expired => SdkOrderStatus::Expired,
        }
    }
}

/// Delivery status of a dispatch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "dispatch_status")]
pub enum DispatchStatus {
    Queued,
    Delivered,
    Dead,
}
