//! Remote run driver: submit a run, then poll it to a terminal status.
//!
//! Status queries that fail transiently are logged and retried inside the
//! poll loop. Only a terminal status, the optional hard timeout, external
//! cancellation or a non-recoverable error (rejected credentials) ends the
//! wait. Timeout and cancellation never touch the remote job; its handle
//! stays valid for later queries.

use crate::error::{Result, RunError};
use crate::model::{RunHandle, RunRequest, RunResult, RunStatus, SessionId, TestIdentifier};
use crate::service::{DeviceSession, ExecutionService, RunStatusReport};
use std::collections::{BTreeMap, BTreeSet};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Default delay between status queries
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default ceiling on a single wait
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Polling behaviour for [`RemoteRunDriver::await_completion`]
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between status queries
    pub interval: Duration,
    /// Hard ceiling on one wait; `None` polls until a terminal status
    pub timeout: Option<Duration>,
    /// Extra attempts per failure report fetch
    pub report_retries: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: Some(DEFAULT_RUN_TIMEOUT),
            report_retries: 3,
        }
    }
}

/// Drives single runs against an [`ExecutionService`]
#[derive(Debug)]
pub struct RemoteRunDriver<S> {
    service: S,
    config: PollConfig,
}

impl<S: ExecutionService> RemoteRunDriver<S> {
    /// Create a driver
    pub fn new(service: S, config: PollConfig) -> Self {
        Self { service, config }
    }

    /// The wrapped service
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Polling configuration
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Submit a run request
    pub async fn submit(&self, request: &RunRequest) -> Result<RunHandle> {
        log::debug!(
            "submitting {} test(s) on {} device(s){}",
            request.selection.tests().len(),
            request.devices.len(),
            if request.options.is_retry_attempt { " (retry)" } else { "" }
        );
        self.service.submit_run(request).await
    }

    /// Poll `handle` until it reaches a terminal status, then collect failures
    pub async fn await_completion(
        &self,
        handle: &RunHandle,
        cancel: &CancellationToken,
    ) -> Result<RunResult> {
        let started = Instant::now();
        let deadline = self.config.timeout.map(|t| started + t);
        let mut transient_failures = 0u32;

        log::info!("Waiting for run {} to complete", handle);

        loop {
            let wait = match deadline {
                Some(deadline) => self
                    .config
                    .interval
                    .min(deadline.saturating_duration_since(Instant::now())),
                None => self.config.interval,
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled(handle)),
                _ = tokio::time::sleep(wait) => {}
            }

            let query = tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled(handle)),
                query = self.service.get_run_status(handle) => query,
            };

            match query {
                Ok(report) if report.status.is_terminal() => {
                    log::info!(
                        "Run {} finished with status {} after {:.0}s",
                        handle,
                        report.status,
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(self.collect_result(handle, report).await);
                }
                Ok(report) => {
                    log::debug!("run {} is {}", handle, report.status);
                }
                Err(e) if e.is_recoverable() => {
                    transient_failures += 1;
                    log::warn!(
                        "Status query for run {} failed ({} so far), will retry: {}",
                        handle,
                        transient_failures,
                        e
                    );
                }
                Err(e) => return Err(e),
            }

            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                log::warn!("Run {} still not finished, giving up waiting", handle);
                return Err(RunError::Timeout {
                    handle: handle.to_string(),
                    elapsed_secs: started.elapsed().as_secs(),
                }
                .into());
            }
        }
    }

    /// Fetch failure reports for every session of a finished run
    async fn collect_result(&self, handle: &RunHandle, report: RunStatusReport) -> RunResult {
        let mut failures_by_device: BTreeMap<_, BTreeSet<TestIdentifier>> = BTreeMap::new();
        let mut device_status = BTreeMap::new();
        let mut unreported_devices = BTreeSet::new();

        for DeviceSession {
            device,
            session_id,
            status,
        } in report.sessions
        {
            let worst = device_status.entry(device.clone()).or_insert(status);
            if *worst == RunStatus::Passed {
                *worst = status;
            }

            let entry = failures_by_device.entry(device.clone()).or_default();
            match self.fetch_report(handle, &session_id).await {
                Ok(failed) => entry.extend(failed),
                Err(e) => {
                    log::warn!(
                        "Could not fetch failure report for {} session {}: {}",
                        device,
                        session_id,
                        e
                    );
                    unreported_devices.insert(device);
                }
            }
        }

        RunResult {
            handle: handle.clone(),
            status: report.status,
            device_status,
            failures_by_device: failures_by_device
                .into_iter()
                .map(|(device, failed)| (device, failed.into_iter().collect()))
                .collect(),
            unreported_devices,
        }
    }

    async fn fetch_report(
        &self,
        handle: &RunHandle,
        session: &SessionId,
    ) -> Result<Vec<TestIdentifier>> {
        let mut attempts = 0;
        loop {
            match self.service.get_failure_report(handle, session).await {
                Ok(failed) => return Ok(failed),
                Err(e) if e.is_recoverable() && attempts < self.config.report_retries => {
                    attempts += 1;
                    log::debug!(
                        "failure report for session {} failed (attempt {}): {}",
                        session,
                        attempts,
                        e
                    );
                    tokio::time::sleep(self.config.interval.min(Duration::from_secs(5))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn cancelled(handle: &RunHandle) -> crate::error::OrchestratorError {
    log::warn!("Stopped waiting for run {}; the remote build keeps running", handle);
    RunError::Cancelled {
        handle: handle.to_string(),
    }
    .into()
}

