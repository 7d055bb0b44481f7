//! Background deadline sweep.
//!
//! One long-lived task, bound to a [`CancellationToken`], that closes open
//! polls past their deadline and retries meeting write-backs that failed
//! earlier. Cancellation is only observed between sweeps.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::finalize::Finalization;
use super::service::PollService;
use crate::error::CoreError;

type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Lifecycle errors for [`AutoFinalizer`].
#[derive(Error, Debug)]
pub enum SweeperError {
    #[error("Auto-finalizer is already running")]
    AlreadyRunning,

    #[error("Auto-finalizer is not running")]
    NotRunning,

    #[error("Auto-finalizer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Polls closed by this sweep
    pub finalized: Vec<String>,
    /// Closed polls whose write-back this sweep completed
    pub committed: Vec<String>,
    /// Polls that failed, with the error message
    pub failed: Vec<(String, String)>,
}

/// Periodic closer for expired polls.
pub struct AutoFinalizer {
    service: Arc<PollService>,
    interval: Duration,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl AutoFinalizer {
    pub fn new(service: Arc<PollService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the sweep loop. The first sweep runs immediately.
    ///
    /// # Errors
    /// [`SweeperError::AlreadyRunning`] if a loop is active.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<(), SweeperError> {
        if self.is_running() {
            return Err(SweeperError::AlreadyRunning);
        }

        // fresh token so a stopped finalizer can be restarted
        self.cancellation_token = CancellationToken::new();

        let service = Arc::clone(&self.service);
        let interval = self.interval;
        let cancel = self.cancellation_token.clone();
        let handle = tokio::spawn(async move {
            Self::sweep_loop(service, interval, cancel).await;
        });
        *self.task_handle.lock().await = Some(handle);

        info!(interval_secs = self.interval.as_secs(), "auto-finalizer started");
        Ok(())
    }

    /// Cancel the loop and wait for it to exit.
    ///
    /// A sweep in progress runs to completion first.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), SweeperError> {
        if !self.is_running() {
            return Err(SweeperError::NotRunning);
        }

        self.cancellation_token.cancel();
        if let Some(handle) = self.task_handle.lock().await.take() {
            handle.await?;
        }

        info!("auto-finalizer stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Run a single sweep now.
    pub async fn sweep_once(&self) -> SweepReport {
        sweep(&self.service).await
    }

    async fn sweep_loop(service: Arc<PollService>, interval: Duration, cancel: CancellationToken) {
        loop {
            // the sweep itself is not raced against cancellation
            let report = sweep(&service).await;
            if !report.finalized.is_empty() || !report.failed.is_empty() {
                info!(
                    finalized = report.finalized.len(),
                    committed = report.committed.len(),
                    failed = report.failed.len(),
                    "sweep complete"
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("sweep loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

async fn sweep(service: &PollService) -> SweepReport {
    let mut report = SweepReport::default();

    match service.store().list_expired_open(service.now()).await {
        Ok(expired) => {
            for poll_id in expired {
                match service.close_poll(&poll_id, None).await {
                    Ok((poll, Finalization::Closed { .. })) => {
                        if poll.outcome_committed() {
                            report.committed.push(poll_id.clone());
                        }
                        report.finalized.push(poll_id);
                    }
                    Ok((_, Finalization::AlreadyClosed)) => {}
                    Err(e) => record_failure(&mut report, poll_id, e),
                }
            }
        }
        Err(e) => error!(error = %e, "failed to list expired polls"),
    }

    match service.store().list_uncommitted_closed().await {
        Ok(pending) => {
            for poll_id in pending {
                if report.finalized.contains(&poll_id) {
                    continue;
                }
                match service.retry_writeback(&poll_id).await {
                    Ok(true) => report.committed.push(poll_id),
                    Ok(false) => {}
                    Err(e) => record_failure(&mut report, poll_id, e),
                }
            }
        }
        Err(e) => error!(error = %e, "failed to list pending write-backs"),
    }

    report
}

fn record_failure(report: &mut SweepReport, poll_id: String, err: CoreError) {
    error!(poll_id = %poll_id, error = %err, "sweep failed for poll");
    report.failed.push((poll_id, err.to_string()));
}
