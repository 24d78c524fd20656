//! WebhookSender job.
//!
//! The WebhookSender is responsible for:
//! - Claiming due jobs from the dispatch queue
//! - Sending HTTP POST requests with a signed body
//! - Handling retries with exponential backoff (2^1 to 2^11 seconds)
//! - Burying jobs once the first attempt and `max_retry` retries have failed

use super::scheduler::{Job, JobError};
use crate::config::DispatchConfig;
use crate::entities::dispatch_jobs::DispatchJobRecord;
use crate::stores::DispatchQueue;
use crate::utils::http_client::HttpClient;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tollgate_sdk::signature::{SIGNATURE_HEADER, SignedBody};
use tracing::{debug, error, info, warn};

/// Maximum backoff exponent (2^11 = 2048 seconds max backoff)
const MAX_RETRY_EXPONENT: u32 = 11;

/// Errors that can occur during webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Webhook endpoint answered with a non-success status
    #[error("webhook delivery failed with status {status}: {body}")]
    DeliveryFailed { status: u16, body: String },

    /// Payload serialization error
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Counters for one delivery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub claimed: usize,
    pub delivered: usize,
    pub rescheduled: usize,
    pub dead: usize,
}

/// WebhookSender delivers queued settlement webhooks to merchant endpoints.
pub struct WebhookSender {
    queue: Arc<dyn DispatchQueue>,
    http: HttpClient,
    config: DispatchConfig,
}

impl WebhookSender {
    pub const JOB_NAME: &'static str = "webhook-dispatch";

    pub fn new(queue: Arc<dyn DispatchQueue>, http: HttpClient, config: DispatchConfig) -> Self {
        Self {
            queue,
            http,
            config,
        }
    }

    /// Claim a batch of due jobs and attempt each once.
    pub async fn deliver_due(&self) -> Result<DeliveryReport, JobError> {
        let jobs = self.queue.claim_due(self.config.batch_size).await?;
        let mut report = DeliveryReport {
            claimed: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            let attempts = u32::try_from(job.attempts).unwrap_or(0) + 1;
            let max_retry = u32::try_from(job.max_retry).unwrap_or(0);

            let result = match self.send_webhook(&job).await {
                Ok(()) => {
                    info!(
                        job_id = %job.id,
                        trade_id = %job.payload.trade_id,
                        attempts,
                        "Webhook delivered successfully"
                    );
                    report.delivered += 1;
                    self.queue.mark_delivered(job.id).await
                }
                Err(e) if attempts > max_retry => {
                    error!(
                        job_id = %job.id,
                        trade_id = %job.payload.trade_id,
                        attempts,
                        error = %e,
                        "Webhook retry budget exhausted, giving up"
                    );
                    report.dead += 1;
                    self.queue.bury(job.id, attempts, e.to_string()).await
                }
                Err(e) => {
                    let delay = calculate_retry_delay(attempts);
                    warn!(
                        job_id = %job.id,
                        trade_id = %job.payload.trade_id,
                        attempts,
                        retry_in_secs = delay.as_secs(),
                        error = %e,
                        "Webhook delivery failed"
                    );
                    report.rescheduled += 1;
                    let next_attempt_at = time::OffsetDateTime::now_utc() + delay;
                    self.queue
                        .reschedule(job.id, attempts, next_attempt_at, e.to_string())
                        .await
                }
            };

            // The claim lease makes the job due again later.
            if let Err(e) = result {
                error!(job_id = %job.id, error = %e, "Failed to record webhook attempt");
            }
        }

        Ok(report)
    }

    /// Send the webhook HTTP request.
    async fn send_webhook(&self, job: &DispatchJobRecord) -> Result<(), WebhookError> {
        let signed = SignedBody::new(job.payload.0.clone(), self.config.secret_bytes())?;

        let response = self
            .http
            .client()
            .post(&job.notify_url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signed.to_header())
            .body(signed.json)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(WebhookError::DeliveryFailed {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl Job for WebhookSender {
    fn name(&self) -> &str {
        Self::JOB_NAME
    }

    async fn run(&self) -> Result<(), JobError> {
        let report = self.deliver_due().await?;
        if report.claimed > 0 {
            info!(
                claimed = report.claimed,
                delivered = report.delivered,
                rescheduled = report.rescheduled,
                dead = report.dead,
                "Webhook dispatch pass finished"
            );
        } else {
            debug!("No webhooks due");
        }
        Ok(())
    }
}

/// Calculate the next retry delay based on retry count.
///
/// Uses exponential backoff: 2^retry_count seconds.
pub fn calculate_retry_delay(retry_count: u32) -> std::time::Duration {
    let seconds = 2u64.pow(retry_count.min(MAX_RETRY_EXPONENT));
    std::time::Duration::from_secs(seconds)
}
