//! HTTP client shared by all deposit sources.
//!
//! Wraps `reqwest::Client` with a per-request timeout and a small retry
//! budget at the transport layer. Retries cover connection failures,
//! timeouts, `429` and `5xx` responses; everything else is returned to the
//! caller on the first attempt.

use crate::config::HttpConfig;
use std::time::Duration;
use tracing::debug;

/// Upper bound on the pause between two attempts.
const MAX_RETRY_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    retries: u32,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("tollgate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            inner,
            retries: config.retries,
        })
    }

    /// The underlying client, for building requests.
    pub fn client(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Send `request`, retrying transient failures.
    ///
    /// After the retry budget is spent the last response (or error) is
    /// returned as is; callers decide what a non-success status means.
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut attempt = 0u32;
        loop {
            // Streaming bodies cannot be cloned; send those exactly once.
            let Some(this_try) = request.try_clone() else {
                return request.send().await;
            };
            let retries_left = attempt < self.retries;

            match this_try.send().await {
                Ok(response) if retries_left && is_retryable_status(response.status()) => {
                    debug!(
                        status = %response.status(),
                        attempt,
                        "Retrying request after upstream status"
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if retries_left && is_retryable_error(&e) => {
                    debug!(error = %e, attempt, "Retrying request after transport error");
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(retry_wait(attempt)).await;
            attempt += 1;
        }
    }
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// 100ms, 200ms, 400ms, ... capped at [`MAX_RETRY_WAIT`].
fn retry_wait(attempt: u32) -> Duration {
    let millis = 100u64.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(millis).min(MAX_RETRY_WAIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::serve_fixture;

    fn client(retries: u32) -> HttpClient {
        HttpClient::new(HttpConfig {
            timeout: Duration::from_secs(5),
            retries,
        })
        .unwrap()
    }

    #[test]
    fn retry_wait_is_capped() {
        assert_eq!(retry_wait(0), Duration::from_millis(100));
        assert_eq!(retry_wait(2), Duration::from_millis(400));
        assert_eq!(retry_wait(10), MAX_RETRY_WAIT);
        assert_eq!(retry_wait(40), MAX_RETRY_WAIT);
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let fixture = serve_fixture(vec![
            (503, String::new()),
            (502, String::new()),
            (200, "ok".to_string()),
        ])
        .await;
        let http = client(3);

        let response = http.send(http.client().get(fixture.url.clone())).await.unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(fixture.hits(), 3);
    }

    #[tokio::test]
    async fn returns_last_response_when_budget_is_spent() {
        let fixture = serve_fixture(vec![(500, String::new())]).await;
        let http = client(2);

        let response = http.send(http.client().get(fixture.url.clone())).await.unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fixture.hits(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let fixture = serve_fixture(vec![(404, String::new())]).await;
        let http = client(3);

        let response = http.send(http.client().get(fixture.url.clone())).await.unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        assert_eq!(fixture.hits(), 1);
    }
}
