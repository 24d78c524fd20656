//! Per-chain scan configuration.

use std::time::Duration;
use tollgate_sdk::objects::Chain;
use url::Url;

/// Default number of transactions requested per indexer page.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Default period between two scans of the same chain.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(15);

/// The asset a chain scan is looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetConfig {
    /// Chain-native asset identifier: fungible asset type on Aptos,
    /// token contract address on Tron and EVM chains.
    pub asset_type: String,
    /// Number of decimal places between the on-chain minor unit and one
    /// whole token (6 for USDT on most chains).
    pub decimals: u32,
}

/// Scan configuration for one chain.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain: Chain,
    /// Period between two scan job runs.
    pub interval: Duration,
    /// Indexer endpoint the deposit source queries.
    pub endpoint: Url,
    /// Optional API key for the indexer.
    pub api_key: Option<String>,
    pub asset: AssetConfig,
    /// Case-insensitive marker that must appear in an event's transfer type
    /// for it to count as an incoming deposit.
    pub deposit_marker: String,
    /// Number of most recent transactions fetched per wallet.
    pub page_size: u32,
    /// Etherscan `chainid` for EVM chains.
    pub evm_chain_id: Option<u64>,
}

impl ChainConfig {
    /// Name of the scan job for this chain, used for logging and run locks.
    pub fn job_name(&self) -> String {
        format!("scan:{}", self.chain)
    }
}
