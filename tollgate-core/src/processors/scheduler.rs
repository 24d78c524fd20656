//! Periodic job scheduler.
//!
//! Every registered job gets its own ticker. A tick only starts a run if the
//! job's [`RunLock`] is free; ticks that arrive while the previous run is
//! still going are dropped, never queued. Different jobs never block each
//! other.

use crate::stores::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Errors that end a job run early.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// A unit of periodic work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run the job body once.
    async fn run(&self) -> Result<(), JobError>;
}

/// Mutual exclusion between runs of one job.
#[derive(Debug, Clone, Default)]
pub struct RunLock {
    inner: Arc<Mutex<()>>,
}

/// Held for the whole duration of a run.
#[derive(Debug)]
pub struct RunGuard {
    _guard: OwnedMutexGuard<()>,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock without waiting. `None` means a run is in progress.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| RunGuard { _guard: guard })
    }
}

/// A job together with its period and run lock.
pub struct ScheduledJob {
    job: Arc<dyn Job>,
    period: Duration,
    lock: RunLock,
}

impl ScheduledJob {
    pub fn new(job: Arc<dyn Job>, period: Duration) -> Self {
        Self {
            job,
            period,
            lock: RunLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.job.name()
    }

    /// Start one run unless the previous one still holds the lock.
    ///
    /// Returns the handle of the started run. The handle resolves once the
    /// body has finished and the lock is released, whether the body returned
    /// an error or panicked.
    pub fn fire(&self) -> Option<JoinHandle<()>> {
        let Some(guard) = self.lock.try_acquire() else {
            debug!(job = %self.job.name(), "Previous run still in progress, skipping tick");
            return None;
        };

        let job = self.job.clone();
        Some(tokio::spawn(async move {
            let name = job.name().to_string();
            let started = Instant::now();
            let body = tokio::spawn(async move { job.run().await });

            match body.await {
                Ok(Ok(())) => {
                    debug!(job = %name, elapsed_ms = started.elapsed().as_millis() as u64, "Job run finished");
                }
                Ok(Err(e)) => {
                    error!(job = %name, error = %e, "Job run failed");
                }
                Err(e) if e.is_panic() => {
                    error!(job = %name, "Job run panicked");
                }
                Err(e) => {
                    warn!(job = %name, error = %e, "Job run was cancelled");
                }
            }
            drop(guard);
        }))
    }
}

/// Drives a set of [`ScheduledJob`]s until shutdown.
#[derive(Default)]
pub struct JobScheduler {
    jobs: Vec<ScheduledJob>,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, job: Arc<dyn Job>, period: Duration) -> &mut Self {
        self.jobs.push(ScheduledJob::new(job, period));
        self
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Tick every job until `shutdown_rx` flips to `true`, then wait for
    /// in-flight runs.
    pub async fn run(self, shutdown_rx: watch::Receiver<bool>) {
        info!(jobs = self.jobs.len(), "Job scheduler started");

        let mut loops = JoinSet::new();
        for job in self.jobs {
            loops.spawn(tick_loop(job, shutdown_rx.clone()));
        }
        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Job ticker terminated abnormally");
            }
        }

        info!("Job scheduler shutdown complete");
    }
}

async fn tick_loop(job: ScheduledJob, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(job.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut running: Option<JoinHandle<()>> = None;

    debug!(job = %job.name(), period_secs = job.period.as_secs_f64(), "Job ticker started");

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                if let Some(handle) = job.fire() {
                    running = Some(handle);
                }
            }
        }
    }

    if let Some(handle) = running {
        debug!(job = %job.name(), "Waiting for in-flight run");
        let _ = handle.await;
    }
    info!(job = %job.name(), "Job ticker stopped");
}
