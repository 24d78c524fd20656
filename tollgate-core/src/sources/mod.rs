//! Deposit sources.
//!
//! A deposit source turns one chain indexer's response into canonical
//! [`DepositEvent`]s for a single wallet. Sources are stateless: every call
//! fetches the newest page for the address and lets the matcher decide what
//! is relevant.
//!
//! - [`AptosDepositSource`]: Aptos GraphQL indexer
//! - [`TronDepositSource`]: TronScan TRC-20 transfer list
//! - [`EvmDepositSource`]: Etherscan v2 `tokentx` (Polygon and other EVM chains)

pub mod aptos;
pub mod evm;
pub mod timestamp;
pub mod tron;

pub use aptos::AptosDepositSource;
pub use evm::EvmDepositSource;
pub use timestamp::{TimestampFormat, TimestampParser};
pub use tron::TronDepositSource;

use crate::config::ChainConfig;
use crate::entities::ChainName;
use crate::utils::http_client::HttpClient;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tollgate_sdk::objects::Chain;
use tracing::warn;

/// One incoming (or outgoing) asset movement observed on a wallet.
///
/// Ephemeral: built per scan and dropped once the matcher has seen it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub chain: ChainName,
    /// Chain-native transaction identifier (hash or version).
    pub external_tx_id: String,
    pub recipient_address: String,
    /// Raw asset identifier as reported by the indexer.
    pub asset_type: String,
    pub success: bool,
    /// Chain-native transfer type tag, e.g. `0x1::fungible_asset::Deposit`.
    pub transfer_type: String,
    /// Amount in whole asset units. Never negative.
    pub amount: Decimal,
    /// Block or transaction time in UTC milliseconds.
    pub observed_at_ms: i64,
}

/// Errors that abort one wallet's fetch.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network or timeout error after transport retries
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body did not have the expected shape
    #[error("decode error: {0}")]
    Decode(String),

    /// Indexer answered with a non-success HTTP status
    #[error("upstream returned status {status}")]
    UpstreamStatus { status: u16 },

    /// Indexer answered 200 but reported an error in the body
    #[error("upstream rejected the query: {message}")]
    Rejected { message: String },
}

/// Fetches the newest deposit events for a wallet.
#[async_trait]
pub trait DepositSource: Send + Sync {
    /// Chain this source reads from.
    fn chain(&self) -> ChainName;

    /// Newest-first page of events touching `address`.
    async fn fetch(&self, address: &str) -> Result<Vec<DepositEvent>, SourceError>;
}

/// Per-asset conversion from on-chain minor units to whole units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetUnits {
    decimals: u32,
}

impl AssetUnits {
    /// `rust_decimal` cannot represent more than 28 fractional digits.
    pub const MAX_DECIMALS: u32 = 28;

    pub fn new(decimals: u32) -> Option<Self> {
        (decimals <= Self::MAX_DECIMALS).then_some(Self { decimals })
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Convert a minor-unit integer to a whole-unit decimal.
    ///
    /// Returns `None` for negative amounts and for values too large for
    /// `Decimal`.
    pub fn to_natural(&self, minor: i128) -> Option<Decimal> {
        if minor < 0 {
            return None;
        }
        Decimal::try_from_i128_with_scale(minor, self.decimals)
            .ok()
            .map(|d| d.normalize())
    }

    /// Parse a decimal string of minor units (as most indexers return them)
    /// and convert it.
    pub fn parse_natural(&self, minor: &str) -> Option<Decimal> {
        minor.trim().parse::<i128>().ok().and_then(|m| self.to_natural(m))
    }
}

/// Convert a raw minor amount for one event, logging and returning `None`
/// when the event has to be dropped.
fn normalize_amount(units: AssetUnits, raw: &str, tx_id: &str) -> Option<Decimal> {
    let amount = units.parse_natural(raw);
    if amount.is_none() {
        warn!(tx_id, raw_amount = raw, "Dropping event with invalid amount");
    }
    amount
}

/// Parse a timestamp for one event, logging and returning `None` when every
/// candidate format fails.
fn normalize_timestamp(parser: &TimestampParser, raw: &str, tx_id: &str) -> Option<i64> {
    match parser.parse_millis(raw) {
        Ok(ms) => Some(ms),
        Err(e) => {
            warn!(tx_id, error = %e, "Dropping event with unparseable timestamp");
            None
        }
    }
}

/// Decode one record of an indexer page.
///
/// A record that does not match the expected shape is logged and skipped so
/// the rest of the page still reaches the matcher.
fn decode_record<T: DeserializeOwned>(chain: ChainName, record: Value) -> Option<T> {
    match serde_json::from_value(record) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(chain = %chain, error = %e, "Skipping malformed indexer record");
            None
        }
    }
}

/// Indexers encode bigint columns as JSON numbers or strings; accept both.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Errors building a source from configuration.
#[derive(Debug, Error)]
pub enum SourceConfigError {
    #[error("asset decimals {0} exceed the supported maximum of 28")]
    Decimals(u32),
    #[error("chain {0} requires evm_chain_id")]
    MissingEvmChainId(Chain),
}

/// Build the deposit source for a configured chain.
pub fn build_source(
    config: &ChainConfig,
    http: HttpClient,
) -> Result<Arc<dyn DepositSource>, SourceConfigError> {
    let units = AssetUnits::new(config.asset.decimals)
        .ok_or(SourceConfigError::Decimals(config.asset.decimals))?;
    let source: Arc<dyn DepositSource> = match config.chain {
        Chain::Aptos => Arc::new(AptosDepositSource::new(config, units, http)),
        Chain::Tron => Arc::new(TronDepositSource::new(config, units, http)),
        Chain::Polygon => {
            let chain_id = config
                .evm_chain_id
                .ok_or(SourceConfigError::MissingEvmChainId(config.chain))?;
            Arc::new(EvmDepositSource::new(config, chain_id, units, http))
        }
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn six_decimals_normalize_minor_units() {
        let units = AssetUnits::new(6).unwrap();
        assert_eq!(
            units.to_natural(10_500_000),
            Some(Decimal::from_str("10.5").unwrap())
        );
        assert_eq!(units.parse_natural("1"), Some(Decimal::from_str("0.000001").unwrap()));
        assert_eq!(units.parse_natural("0"), Some(Decimal::ZERO));
    }

    #[test]
    fn eighteen_decimals_keep_precision() {
        let units = AssetUnits::new(18).unwrap();
        assert_eq!(
            units.parse_natural("1234500000000000000"),
            Some(Decimal::from_str("1.2345").unwrap())
        );
    }

    #[test]
    fn negative_and_garbage_amounts_are_rejected() {
        let units = AssetUnits::new(6).unwrap();
        assert_eq!(units.to_natural(-1), None);
        assert_eq!(units.parse_natural("-5000"), None);
        assert_eq!(units.parse_natural("12.5"), None);
        assert_eq!(units.parse_natural(""), None);
    }

    #[test]
    fn oversized_amount_is_rejected() {
        let units = AssetUnits::new(6).unwrap();
        assert_eq!(units.to_natural(i128::MAX), None);
    }

    #[derive(Debug, serde::Deserialize)]
    struct Record {
        id: String,
    }

    #[test]
    fn malformed_record_decodes_to_none() {
        let good: Option<Record> = decode_record(ChainName::Tron, serde_json::json!({ "id": "a" }));
        let bad: Option<Record> = decode_record(ChainName::Tron, serde_json::json!({ "id": 7 }));
        assert_eq!(good.unwrap().id, "a");
        assert!(bad.is_none());
    }

    #[test]
    fn scalars_accept_numbers_and_strings() {
        assert_eq!(scalar_to_string(&serde_json::json!(42)).as_deref(), Some("42"));
        assert_eq!(scalar_to_string(&serde_json::json!("42")).as_deref(), Some("42"));
        assert_eq!(scalar_to_string(&Value::Null), None);
    }

    #[test]
    fn decimals_above_decimal_scale_are_refused() {
        assert!(AssetUnits::new(28).is_some());
        assert!(AssetUnits::new(29).is_none());
    }
}
