//! Per-chain scan job.
//!
//! One run lists the chain's locked wallets, scans every wallet in its own
//! task and waits for all of them before returning. A wallet whose fetch
//! fails or panics only loses this run; its siblings are unaffected.

use super::matcher::{MatchError, MatchOutcome, Matcher};
use super::scheduler::{Job, JobError};
use super::settlement::{SettlementCoordinator, SettlementOutcome};
use crate::entities::ChainName;
use crate::sources::{DepositSource, SourceError};
use crate::stores::WalletPool;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

/// Counters for one scan run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub wallets: usize,
    pub events: usize,
    pub settled: usize,
    pub duplicates: usize,
    pub failed_wallets: usize,
    pub failed_events: usize,
}

#[derive(Debug, Default)]
struct WalletReport {
    events: usize,
    settled: usize,
    duplicates: usize,
    failed_events: usize,
}

struct ScanContext {
    source: Arc<dyn DepositSource>,
    matcher: Matcher,
    settlement: Arc<SettlementCoordinator>,
}

pub struct ScanJob {
    name: String,
    chain: ChainName,
    wallets: Arc<dyn WalletPool>,
    ctx: Arc<ScanContext>,
}

impl ScanJob {
    pub fn new(
        name: impl Into<String>,
        wallets: Arc<dyn WalletPool>,
        source: Arc<dyn DepositSource>,
        matcher: Matcher,
        settlement: Arc<SettlementCoordinator>,
    ) -> Self {
        Self {
            name: name.into(),
            chain: source.chain(),
            wallets,
            ctx: Arc::new(ScanContext {
                source,
                matcher,
                settlement,
            }),
        }
    }

    pub fn chain(&self) -> ChainName {
        self.chain
    }

    /// Scan every locked wallet once and wait for all of them.
    pub async fn scan(&self) -> Result<ScanSummary, JobError> {
        let wallets = self.wallets.locked_wallets(self.chain).await?;
        let mut summary = ScanSummary {
            wallets: wallets.len(),
            ..Default::default()
        };
        if wallets.is_empty() {
            trace!(chain = %self.chain, "No locked wallets to scan");
            return Ok(summary);
        }

        let mut tasks = JoinSet::new();
        for wallet in wallets {
            let ctx = self.ctx.clone();
            tasks.spawn(async move {
                let result = ctx.scan_wallet(&wallet).await;
                (wallet, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => {
                    summary.events += report.events;
                    summary.settled += report.settled;
                    summary.duplicates += report.duplicates;
                    summary.failed_events += report.failed_events;
                }
                Ok((wallet, Err(e))) => {
                    summary.failed_wallets += 1;
                    warn!(chain = %self.chain, wallet = %wallet, error = %e, "Failed to fetch deposits for wallet");
                }
                Err(e) => {
                    summary.failed_wallets += 1;
                    error!(
                        chain = %self.chain,
                        panicked = e.is_panic(),
                        error = %e,
                        "Wallet scan task aborted"
                    );
                }
            }
        }

        Ok(summary)
    }
}

impl ScanContext {
    /// Fetch one wallet's newest events and process them in order.
    async fn scan_wallet(&self, wallet: &str) -> Result<WalletReport, SourceError> {
        let events = self.source.fetch(wallet).await?;
        let mut report = WalletReport {
            events: events.len(),
            ..Default::default()
        };

        for event in &events {
            let order = match self.matcher.find_match(event, wallet).await {
                Ok(MatchOutcome::Matched(order)) => order,
                Ok(MatchOutcome::Filtered(reason)) => {
                    trace!(tx_id = %event.external_tx_id, ?reason, "Event filtered");
                    continue;
                }
                Ok(MatchOutcome::NoOrder) => {
                    trace!(tx_id = %event.external_tx_id, amount = %event.amount, "No pending order for event");
                    continue;
                }
                Ok(MatchOutcome::NonCausal { .. }) => continue,
                Err(MatchError::Ambiguous { count }) => {
                    report.failed_events += 1;
                    error!(
                        wallet,
                        tx_id = %event.external_tx_id,
                        amount = %event.amount,
                        count,
                        "Several pending orders expect this amount; skipping event"
                    );
                    continue;
                }
                Err(e) => {
                    report.failed_events += 1;
                    error!(wallet, tx_id = %event.external_tx_id, error = %e, "Failed to match event");
                    continue;
                }
            };

            match self.settlement.settle(&order, event).await {
                Ok(SettlementOutcome::Settled) => report.settled += 1,
                Ok(SettlementOutcome::AlreadySettled) => report.duplicates += 1,
                Err(e) => {
                    report.failed_events += 1;
                    error!(
                        trade_id = %order.trade_id,
                        tx_id = %event.external_tx_id,
                        error = %e,
                        "Failed to settle order"
                    );
                }
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl Job for ScanJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<(), JobError> {
        let summary = self.scan().await?;
        if summary.wallets == 0 {
            return Ok(());
        }
        if summary.settled > 0 || summary.failed_wallets > 0 || summary.failed_events > 0 {
            info!(
                job = %self.name,
                wallets = summary.wallets,
                events = summary.events,
                settled = summary.settled,
                duplicates = summary.duplicates,
                failed_wallets = summary.failed_wallets,
                failed_events = summary.failed_events,
                "Scan finished"
            );
        } else {
            debug!(
                job = %self.name,
                wallets = summary.wallets,
                events = summary.events,
                "Scan finished"
            );
        }
        Ok(())
    }
}
