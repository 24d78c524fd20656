//! Operator notifications.
//!
//! Notifications are fire-and-forget: a failed message is logged and never
//! affects settlement.

use crate::entities::order_records::OrderRecord;
use crate::sources::DepositEvent;
use crate::utils::http_client::HttpClient;
use serde_json::json;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{info, warn};
use url::Url;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

pub trait Notifier: Send + Sync {
    /// Queue `message` for delivery. Must not block the caller.
    fn notify(&self, message: String);
}

/// Logs messages instead of sending them. Used when no bot is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: String) {
        info!(message = %message, "Notification");
    }
}

/// Sends HTML messages through the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    send_message_url: Url,
    chat_id: String,
    http: HttpClient,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: String, http: HttpClient) -> Result<Self, url::ParseError> {
        Self::with_api_base(TELEGRAM_API_BASE, bot_token, chat_id, http)
    }

    /// Point the notifier at a different Bot API host.
    pub fn with_api_base(
        api_base: &str,
        bot_token: &str,
        chat_id: String,
        http: HttpClient,
    ) -> Result<Self, url::ParseError> {
        let base = api_base.trim_end_matches('/');
        let send_message_url = Url::parse(&format!("{base}/bot{bot_token}/sendMessage"))?;
        Ok(Self {
            send_message_url,
            chat_id,
            http,
        })
    }

    async fn send(&self, text: String) {
        let request = self.http.client().post(self.send_message_url.clone()).json(&json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        }));
        match self.http.send(request).await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(status = %response.status(), "Telegram rejected notification");
            }
            Err(e) => {
                warn!(error = %e, "Failed to send Telegram notification");
            }
        }
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, message: String) {
        let this = self.clone();
        tokio::spawn(async move { this.send(message).await });
    }
}

/// Operator message for a freshly settled order.
pub fn format_settlement_message(
    order: &OrderRecord,
    event: &DepositEvent,
    settled_at: OffsetDateTime,
) -> String {
    format!(
        "<b>New {chain} payment settled</b>\n\
         <pre>Trade ID: {trade_id}</pre>\n\
         <pre>Order ID: {order_id}</pre>\n\
         <pre>Requested amount: {amount}</pre>\n\
         <pre>Actual amount: {actual_amount}</pre>\n\
         <pre>Wallet: {wallet}</pre>\n\
         <pre>Created at: {created_at}</pre>\n\
         <pre>Settled at: {settled_at}</pre>\n\
         <pre>Transaction: {tx_id}</pre>",
        chain = order.chain,
        trade_id = escape_html(&order.trade_id),
        order_id = escape_html(&order.order_id),
        amount = order.amount,
        actual_amount = order.actual_amount,
        wallet = escape_html(&order.wallet_address),
        created_at = format_datetime(order.created_at),
        settled_at = format_datetime(settled_at),
        tx_id = escape_html(&event.external_tx_id),
    )
}

fn format_datetime(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second] UTC"
    ))
    .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
