//! Webhook dispatch and notification configuration.

use std::time::Duration;

/// Configuration for the dispatch queue and its delivery job.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Period of the webhook delivery job.
    pub interval: Duration,
    /// Retries allowed after the first delivery attempt of each webhook.
    pub max_retry: u32,
    /// Maximum number of jobs claimed per run.
    pub batch_size: u32,
    /// Secret key bytes for HMAC signing of webhook bodies.
    secret: Box<[u8]>,
}

impl DispatchConfig {
    pub const DEFAULT_MAX_RETRY: u32 = 5;

    pub fn new(
        interval: Duration,
        max_retry: u32,
        batch_size: u32,
        secret: impl Into<Box<[u8]>>,
    ) -> Self {
        Self {
            interval,
            max_retry,
            batch_size,
            secret: secret.into(),
        }
    }

    /// Get the secret key bytes for HMAC signing.
    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}

/// Telegram bot used for operator notifications.
#[derive(Debug, Clone, Default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}
