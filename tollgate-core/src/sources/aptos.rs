//! Aptos deposit source backed by the Aptos GraphQL indexer.

use super::{
    AssetUnits, DepositEvent, DepositSource, SourceError, TimestampFormat, TimestampParser,
    decode_record, normalize_amount, normalize_timestamp, scalar_to_string,
};
use crate::config::ChainConfig;
use crate::entities::ChainName;
use crate::utils::http_client::HttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

const ACCOUNT_TRANSACTIONS_QUERY: &str = r#"query AccountTransactionsData($address: String, $limit: Int, $offset: Int) {
  account_transactions(
    where: {account_address: {_eq: $address}}
    order_by: {transaction_version: desc}
    limit: $limit
    offset: $offset
  ) {
    transaction_version
    fungible_asset_activities {
      amount
      asset_type
      is_transaction_success
      type
      owner_address
    }
    user_transaction {
      timestamp
    }
  }
}"#;

/// Reads fungible asset activities of an account, newest transaction first.
pub struct AptosDepositSource {
    endpoint: Url,
    api_key: Option<String>,
    page_size: u32,
    units: AssetUnits,
    timestamps: TimestampParser,
    http: HttpClient,
}

impl AptosDepositSource {
    pub fn new(config: &ChainConfig, units: AssetUnits, http: HttpClient) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            page_size: config.page_size,
            units,
            // The indexer omits the offset; values are UTC.
            timestamps: TimestampParser::new([
                TimestampFormat::NaiveUtcSubsecond,
                TimestampFormat::NaiveUtc,
                TimestampFormat::Rfc3339,
            ]),
            http,
        }
    }

    fn to_events(&self, transactions: Vec<Value>) -> Vec<DepositEvent> {
        let mut events = Vec::new();
        for record in transactions {
            let Some(tx) = decode_record::<AccountTransaction>(ChainName::Aptos, record) else {
                continue;
            };
            let Some(version) = scalar_to_string(&tx.transaction_version) else {
                warn!("Skipping Aptos transaction without a version");
                continue;
            };
            let Some(raw_ts) = tx
                .user_transaction
                .and_then(|u| u.timestamp)
                .filter(|ts| !ts.is_empty())
            else {
                debug!(version = %version, "Skipping Aptos transaction without timestamp");
                continue;
            };
            let Some(observed_at_ms) = normalize_timestamp(&self.timestamps, &raw_ts, &version)
            else {
                continue;
            };

            for record in tx.fungible_asset_activities {
                let Some(activity) = decode_record::<FungibleAssetActivity>(ChainName::Aptos, record)
                else {
                    continue;
                };
                let Some(raw_amount) = activity.amount.as_ref().and_then(scalar_to_string) else {
                    continue;
                };
                let Some(amount) = normalize_amount(self.units, &raw_amount, &version) else {
                    continue;
                };
                events.push(DepositEvent {
                    chain: ChainName::Aptos,
                    external_tx_id: version.clone(),
                    recipient_address: activity.owner_address.unwrap_or_default(),
                    asset_type: activity.asset_type.unwrap_or_default(),
                    success: activity.is_transaction_success.unwrap_or(false),
                    transfer_type: activity.kind.unwrap_or_default(),
                    amount,
                    observed_at_ms,
                });
            }
        }
        events
    }
}

#[async_trait]
impl DepositSource for AptosDepositSource {
    fn chain(&self) -> ChainName {
        ChainName::Aptos
    }

    async fn fetch(&self, address: &str) -> Result<Vec<DepositEvent>, SourceError> {
        let payload = json!({
            "query": ACCOUNT_TRANSACTIONS_QUERY,
            "variables": {
                "address": address,
                "limit": self.page_size,
                "offset": 0,
            },
            "operationName": "AccountTransactionsData",
        });

        let mut request = self
            .http
            .client()
            .post(self.endpoint.clone())
            .json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = self.http.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let decoded: GraphqlResponse =
            serde_json::from_str(&body).map_err(|e| SourceError::Decode(e.to_string()))?;
        if let Some(error) = decoded.errors.into_iter().next() {
            return Err(SourceError::Rejected {
                message: error.message,
            });
        }
        let data = decoded
            .data
            .ok_or_else(|| SourceError::Decode("response has neither data nor errors".into()))?;

        Ok(self.to_events(data.account_transactions))
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<AccountTransactionsData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct AccountTransactionsData {
    #[serde(default)]
    account_transactions: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AccountTransaction {
    transaction_version: Value,
    #[serde(default)]
    fungible_asset_activities: Vec<Value>,
    user_transaction: Option<UserTransaction>,
}

#[derive(Debug, Deserialize)]
struct FungibleAssetActivity {
    amount: Option<Value>,
    asset_type: Option<String>,
    is_transaction_success: Option<bool>,
    #[serde(rename = "type")]
    kind: Option<String>,
    owner_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserTransaction {
    timestamp: Option<String>,
}
