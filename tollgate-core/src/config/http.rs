//! Outbound HTTP configuration for indexer calls.

use std::time::Duration;

/// Timeout and retry budget applied to every indexer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Additional attempts after the first one fails at the transport layer.
    pub retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 3,
        }
    }
}
