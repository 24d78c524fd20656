//! TOML file configuration structures.
//!
//! These structs directly map to the `tollgate-config.toml` file format.

use serde::Deserialize;
use tollgate_core::config::DispatchConfig;
use tollgate_sdk::objects::Chain;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub chains: Vec<ChainSection>,
    #[serde(default)]
    pub http: HttpSection,
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub telegram: Option<TelegramSection>,
}

/// One `[[chains]]` entry: a chain to scan and the asset to look for.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSection {
    pub chain: Chain,
    #[serde(default = "default_scan_interval_secs")]
    pub interval_secs: u64,
    /// Indexer endpoint (GraphQL URL, TronScan transfer list or Etherscan API).
    pub endpoint: Url,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Fungible asset type (Aptos) or token contract address.
    pub asset_type: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    #[serde(default = "default_deposit_marker")]
    pub deposit_marker: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Required for EVM chains.
    #[serde(default)]
    pub evm_chain_id: Option<u64>,
}

/// Outbound HTTP settings for indexer calls.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
        }
    }
}

/// Webhook dispatch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_dispatch_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Secret key used to sign webhook bodies.
    pub merchant_secret: String,
}

/// Telegram bot for operator notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    pub bot_token: String,
    pub chat_id: String,
}

fn default_scan_interval_secs() -> u64 {
    15
}

fn default_decimals() -> u32 {
    6 // Most stablecoins use 6 decimals
}

fn default_deposit_marker() -> String {
    "::deposit".to_string()
}

fn default_page_size() -> u32 {
    25
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_dispatch_interval_secs() -> u64 {
    10
}

fn default_max_retry() -> u32 {
    DispatchConfig::DEFAULT_MAX_RETRY
}

fn default_batch_size() -> u32 {
    32
}
