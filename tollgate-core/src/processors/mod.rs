//! Reconciliation processors.
//!
//! - `ScanJob`: lists locked wallets, fans out one deposit fetch per wallet
//! - `Matcher`: filters deposit events and finds the pending order they pay
//! - `SettlementCoordinator`: marks orders paid, queues webhooks, notifies
//! - `WebhookSender`: drains the dispatch queue with exponential backoff
//! - `JobScheduler`: ticks jobs periodically, skipping overlapping runs

pub mod matcher;
pub mod scan_job;
pub mod scheduler;
pub mod settlement;
pub mod webhook_sender;

pub use matcher::{FilterReason, MatchError, MatchOutcome, MatchRules, Matcher};
pub use scan_job::{ScanJob, ScanSummary};
pub use scheduler::{Job, JobError, JobScheduler, RunGuard, RunLock, ScheduledJob};
pub use settlement::{SettlementCoordinator, SettlementError, SettlementOutcome};
pub use webhook_sender::{DeliveryReport, WebhookError, WebhookSender, calculate_retry_delay};
