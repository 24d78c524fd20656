//! EVM deposit source backed by the Etherscan v2 multichain API.

use super::{
    AssetUnits, DepositEvent, DepositSource, SourceError, TimestampFormat, TimestampParser,
    decode_record, normalize_amount, normalize_timestamp,
};
use crate::config::ChainConfig;
use crate::entities::ChainName;
use crate::utils::http_client::HttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

pub const DEPOSIT_TAG: &str = "erc20::deposit";
pub const WITHDRAW_TAG: &str = "erc20::withdraw";

const NO_TRANSACTIONS: &str = "No transactions found";

pub struct EvmDepositSource {
    chain: ChainName,
    /// Full URL of the Etherscan v2 API, e.g. `https://api.etherscan.io/v2/api`.
    endpoint: Url,
    api_key: Option<String>,
    chain_id: u64,
    contract_address: String,
    page_size: u32,
    units: AssetUnits,
    timestamps: TimestampParser,
    http: HttpClient,
}

impl EvmDepositSource {
    pub fn new(config: &ChainConfig, chain_id: u64, units: AssetUnits, http: HttpClient) -> Self {
        Self {
            chain: config.chain.into(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            chain_id,
            contract_address: config.asset.asset_type.clone(),
            page_size: config.page_size,
            units,
            timestamps: TimestampParser::new([TimestampFormat::UnixSeconds]),
            http,
        }
    }

    fn to_event(&self, address: &str, item: TokenTransferItem) -> Option<DepositEvent> {
        let amount = normalize_amount(self.units, &item.value, &item.hash)?;
        let observed_at_ms = normalize_timestamp(&self.timestamps, &item.time_stamp, &item.hash)?;
        let transfer_type = if item.to.eq_ignore_ascii_case(address) {
            DEPOSIT_TAG
        } else {
            WITHDRAW_TAG
        };

        Some(DepositEvent {
            chain: self.chain,
            external_tx_id: item.hash,
            recipient_address: item.to,
            asset_type: item.contract_address,
            // tokentx only lists transfers whose log was emitted.
            success: true,
            transfer_type: transfer_type.to_string(),
            amount,
            observed_at_ms,
        })
    }
}

#[async_trait]
impl DepositSource for EvmDepositSource {
    fn chain(&self) -> ChainName {
        self.chain
    }

    async fn fetch(&self, address: &str) -> Result<Vec<DepositEvent>, SourceError> {
        let chain_id = self.chain_id.to_string();
        let offset = self.page_size.to_string();
        let request = self.http.client().get(self.endpoint.clone()).query(&[
            ("apikey", self.api_key.as_deref().unwrap_or_default()),
            ("chainid", chain_id.as_str()),
            ("module", "account"),
            ("action", "tokentx"),
            ("contractaddress", self.contract_address.as_str()),
            ("address", address),
            ("page", "1"),
            ("offset", offset.as_str()),
            ("sort", "desc"),
        ]);

        let response = self.http.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let decoded: EtherscanResponse =
            serde_json::from_str(&body).map_err(|e| SourceError::Decode(e.to_string()))?;

        if decoded.status != "1" {
            if decoded.message.starts_with(NO_TRANSACTIONS) {
                debug!(chain = %self.chain, address, "No token transfers for address");
                return Ok(Vec::new());
            }
            // On errors `result` carries the human-readable reason.
            let message = match decoded.result {
                Value::String(reason) if !reason.is_empty() => reason,
                _ => decoded.message,
            };
            return Err(SourceError::Rejected { message });
        }

        let Value::Array(records) = decoded.result else {
            return Err(SourceError::Decode("tokentx result is not a list".into()));
        };
        Ok(records
            .into_iter()
            .filter_map(|record| decode_record::<TokenTransferItem>(self.chain, record))
            .filter_map(|item| self.to_event(address, item))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTransferItem {
    hash: String,
    time_stamp: String,
    to: String,
    value: String,
    contract_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{chain_config, serve_fixture, test_http_client};
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;
    use tollgate_sdk::objects::Chain;

    const USDT: &str = "0xc2132d05d31c914a87c6611c10748aeb04b58e8f";
    const WALLET: &str = "0xAbC0000000000000000000000000000000000001";

    fn source(url: Url) -> EvmDepositSource {
        let mut config = chain_config(Chain::Polygon, USDT);
        config.endpoint = url;
        config.api_key = Some("key".to_string());
        EvmDepositSource::new(&config, 137, AssetUnits::new(6).unwrap(), test_http_client())
    }

    #[tokio::test]
    async fn maps_token_transfers() {
        let body = json!({
            "status": "1",
            "message": "OK",
            "result": [
                {
                    "blockNumber": "57000000",
                    "timeStamp": "1714521605",
                    "hash": "0xdead",
                    "from": "0x1111",
                    "to": WALLET.to_lowercase(),
                    "value": "7250000",
                    "contractAddress": USDT,
                    "tokenDecimal": "6"
                },
                {
                    "blockNumber": "56999999",
                    "timeStamp": "1714521600",
                    "hash": "0xbeef",
                    "from": WALLET.to_lowercase(),
                    "to": "0x2222",
                    "value": "1000000",
                    "contractAddress": USDT,
                    "tokenDecimal": "6"
                }
            ]
        })
        .to_string();
        let fixture = serve_fixture(vec![(200, body)]).await;
        let events = source(fixture.url.clone()).fetch(WALLET).await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].chain, ChainName::Polygon);
        assert_eq!(events[0].external_tx_id, "0xdead");
        assert_eq!(events[0].amount, Decimal::from_str("7.25").unwrap());
        assert_eq!(events[0].observed_at_ms, 1_714_521_605_000);
        assert_eq!(events[0].transfer_type, DEPOSIT_TAG);
        assert_eq!(events[1].transfer_type, WITHDRAW_TAG);

        let target = &fixture.targets()[0];
        assert!(target.contains("chainid=137"));
        assert!(target.contains("action=tokentx"));
        assert!(target.contains("sort=desc"));
        assert!(target.contains("offset=25"));
    }

    #[tokio::test]
    async fn malformed_item_is_skipped() {
        let body = json!({
            "status": "1",
            "message": "OK",
            "result": [
                {
                    "timeStamp": "1714521605",
                    "hash": "0xdead",
                    "to": WALLET.to_lowercase(),
                    "value": "7250000",
                    "contractAddress": USDT
                },
                {
                    "timeStamp": 1714521600,
                    "hash": "0xbeef",
                    "to": WALLET.to_lowercase(),
                    "value": "1000000"
                }
            ]
        })
        .to_string();
        let fixture = serve_fixture(vec![(200, body)]).await;
        let events = source(fixture.url.clone()).fetch(WALLET).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].external_tx_id, "0xdead");
    }

    #[tokio::test]
    async fn no_transactions_is_an_empty_page() {
        let body = json!({
            "status": "0",
            "message": "No transactions found",
            "result": []
        })
        .to_string();
        let fixture = serve_fixture(vec![(200, body)]).await;
        let events = source(fixture.url.clone()).fetch(WALLET).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn notok_is_rejected_with_reason() {
        let body = json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Invalid API Key"
        })
        .to_string();
        let fixture = serve_fixture(vec![(200, body)]).await;
        let err = source(fixture.url.clone()).fetch(WALLET).await.unwrap_err();
        assert!(matches!(err, SourceError::Rejected { message } if message == "Invalid API Key"));
    }
}
