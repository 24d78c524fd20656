//! Tron deposit source backed by the TronScan TRC-20 transfer list.

use super::{
    AssetUnits, DepositEvent, DepositSource, SourceError, TimestampFormat, TimestampParser,
    decode_record, normalize_amount, normalize_timestamp, scalar_to_string,
};
use crate::config::ChainConfig;
use crate::entities::ChainName;
use crate::utils::http_client::HttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use url::Url;

pub const DEPOSIT_TAG: &str = "trc20::deposit";
pub const WITHDRAW_TAG: &str = "trc20::withdraw";

const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";

pub struct TronDepositSource {
    /// Full URL of the `/api/filter/trc20/transfers` listing.
    endpoint: Url,
    api_key: Option<String>,
    contract_address: String,
    page_size: u32,
    units: AssetUnits,
    timestamps: TimestampParser,
    http: HttpClient,
}

impl TronDepositSource {
    pub fn new(config: &ChainConfig, units: AssetUnits, http: HttpClient) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            contract_address: config.asset.asset_type.clone(),
            page_size: config.page_size,
            units,
            timestamps: TimestampParser::new([TimestampFormat::UnixMillis]),
            http,
        }
    }

    fn to_event(&self, address: &str, transfer: Trc20TransferData) -> Option<DepositEvent> {
        let tx_id = transfer.transaction_id;
        let Some(raw_ts) = scalar_to_string(&transfer.block_ts) else {
            warn!(tx_id, "Dropping event without block timestamp");
            return None;
        };
        let amount = normalize_amount(self.units, &transfer.quant, &tx_id)?;
        let observed_at_ms = normalize_timestamp(&self.timestamps, &raw_ts, &tx_id)?;
        let transfer_type = if transfer.to_address.eq_ignore_ascii_case(address) {
            DEPOSIT_TAG
        } else {
            WITHDRAW_TAG
        };

        Some(DepositEvent {
            chain: ChainName::Tron,
            external_tx_id: tx_id,
            recipient_address: transfer.to_address,
            asset_type: transfer.contract_address.unwrap_or_default(),
            success: transfer
                .final_result
                .as_deref()
                .is_none_or(|r| r.eq_ignore_ascii_case("SUCCESS")),
            transfer_type: transfer_type.to_string(),
            amount,
            observed_at_ms,
        })
    }
}

#[async_trait]
impl DepositSource for TronDepositSource {
    fn chain(&self) -> ChainName {
        ChainName::Tron
    }

    async fn fetch(&self, address: &str) -> Result<Vec<DepositEvent>, SourceError> {
        let mut request = self.http.client().get(self.endpoint.clone()).query(&[
            ("limit", self.page_size.to_string().as_str()),
            ("start", "0"),
            ("sort", "-timestamp"),
            ("contract_address", self.contract_address.as_str()),
            ("toAddress", address),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = self.http.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let decoded: TronScanResponse =
            serde_json::from_str(&body).map_err(|e| SourceError::Decode(e.to_string()))?;

        Ok(decoded
            .token_transfers
            .into_iter()
            .filter_map(|record| decode_record(ChainName::Tron, record))
            .filter_map(|transfer| self.to_event(address, transfer))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct TronScanResponse {
    #[serde(default)]
    token_transfers: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Trc20TransferData {
    transaction_id: String,
    /// Unix milliseconds, as a number or a numeric string.
    block_ts: Value,
    to_address: String,
    quant: String,
    contract_address: Option<String>,
    #[serde(rename = "finalResult")]
    final_result: Option<String>,
}
