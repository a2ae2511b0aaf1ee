//! Failure retry controller.
//!
//! Runs the full shard plan once across every device, then resubmits only
//! the failing test classes, one narrowed run per still-failing device,
//! until everything passes or the retry budget is spent. Rounds are strictly
//! sequential; the runs inside a round are awaited concurrently and all of
//! them are collected before the next round is planned.
//!
//! A submission that errors (rejected, timed out, cancelled) never aborts
//! the controller: every device it targeted keeps the tests it was sent.

use crate::driver::RemoteRunDriver;
use crate::error::{ConfigError, Result};
use crate::model::{
    ArtifactSet, DeviceTarget, RetryState, RunHandle, RunOptions, RunRequest, RunResult,
    RunStatus, Shard, TestIdentifier, TestSelection,
};
use crate::service::ExecutionService;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;

/// Tests sent to each device in one submission
type Targeted = BTreeMap<DeviceTarget, Vec<TestIdentifier>>;

/// What happened to one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    /// Devices the submission targeted
    pub devices: Vec<DeviceTarget>,
    /// Number of test classes sent per device
    pub tests_submitted: usize,
    /// Run handle, if the service accepted the submission
    pub handle: Option<RunHandle>,
    /// Terminal status, if the run was awaited to completion
    pub status: Option<RunStatus>,
    /// Error that ended the submission early
    pub error: Option<String>,
    /// Failures carried out of this submission
    pub failures: RetryState,
}

/// One round: the initial run (round 0) or a retry round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    /// Round number; 0 is the initial run
    pub round: u32,
    /// Submissions made in this round
    pub submissions: Vec<SubmissionOutcome>,
    /// Outstanding failures after the round
    pub outstanding: RetryState,
}

/// Aggregate result of [`RetryController::run`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalResult {
    /// True iff no failures remain
    pub overall_passed: bool,
    /// Failures still outstanding per device
    pub remaining_failures: RetryState,
    /// Retry rounds used, never more than the budget
    pub retries_used: u32,
    /// Per-round history
    pub rounds: Vec<RoundReport>,
}

/// Bounded failure-only retry over a [`RemoteRunDriver`]
#[derive(Debug)]
pub struct RetryController<S> {
    driver: RemoteRunDriver<S>,
    artifacts: ArtifactSet,
    options: RunOptions,
}

impl<S: ExecutionService> RetryController<S> {
    /// Create a controller submitting against `artifacts` with `options`
    pub fn new(driver: RemoteRunDriver<S>, artifacts: ArtifactSet, options: RunOptions) -> Self {
        Self {
            driver,
            artifacts,
            options,
        }
    }

    /// The underlying driver
    pub fn driver(&self) -> &RemoteRunDriver<S> {
        &self.driver
    }

    /// Run `plan` on `devices`, then retry failures up to `max_retries` rounds.
    ///
    /// Only configuration problems are returned as errors; remote failures
    /// are folded into the result.
    pub async fn run(
        &self,
        plan: &[Shard],
        devices: &[DeviceTarget],
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<FinalResult> {
        if devices.is_empty() {
            return Err(ConfigError::NoDevices.into());
        }
        let planned: Vec<TestIdentifier> = plan.iter().flat_map(|s| s.tests.clone()).collect();
        if planned.is_empty() {
            return Err(ConfigError::NoTests.into());
        }

        let request = RunRequest {
            artifacts: self.artifacts.clone(),
            devices: devices.to_vec(),
            selection: TestSelection::Shards(plan.to_vec()),
            options: RunOptions {
                is_retry_attempt: false,
                ..self.options.clone()
            },
        };
        let targeted: Targeted = devices
            .iter()
            .map(|device| (device.clone(), planned.clone()))
            .collect();

        log::info!(
            "Running {} test class(es) in {} shard(s) on {} device(s)",
            planned.len(),
            plan.len(),
            devices.len()
        );
        let initial = self.execute(request, targeted, cancel).await;
        let mut state = initial.failures.clone();
        let mut rounds = vec![RoundReport {
            round: 0,
            submissions: vec![initial],
            outstanding: state.clone(),
        }];

        let mut retries_used = 0;
        while retries_used < max_retries && !state.is_empty() {
            if cancel.is_cancelled() {
                log::warn!("Cancellation requested; skipping remaining retry rounds");
                break;
            }

            log::info!(
                "Retry round {}/{}: {} failing class(es) on {} device(s)",
                retries_used + 1,
                max_retries,
                state.failure_count(),
                state.device_count()
            );

            let attempts = state.iter().map(|(device, failing)| {
                let request = RunRequest {
                    artifacts: self.artifacts.clone(),
                    devices: vec![device.clone()],
                    selection: TestSelection::ClassFilter(failing.clone()),
                    options: self.options.for_retry(),
                };
                let targeted = Targeted::from([(device.clone(), failing.clone())]);
                self.execute(request, targeted, cancel)
            });
            let submissions = join_all(attempts).await;

            for submission in &submissions {
                for device in &submission.devices {
                    let failures = submission
                        .failures
                        .get(device)
                        .map(<[TestIdentifier]>::to_vec)
                        .unwrap_or_default();
                    if failures.is_empty() {
                        log::info!("{} passed on retry", device);
                    }
                    state.record(device.clone(), failures);
                }
            }

            retries_used += 1;
            rounds.push(RoundReport {
                round: retries_used,
                submissions,
                outstanding: state.clone(),
            });
        }

        Ok(FinalResult {
            overall_passed: state.is_empty(),
            remaining_failures: state,
            retries_used,
            rounds,
        })
    }

    /// Submit one request and await it; errors become carried-forward failures
    async fn execute(
        &self,
        request: RunRequest,
        targeted: Targeted,
        cancel: &CancellationToken,
    ) -> SubmissionOutcome {
        let tests_submitted = targeted.values().map(Vec::len).max().unwrap_or(0);
        let devices = request.devices.clone();

        let (handle, awaited) = match self.driver.submit(&request).await {
            Ok(handle) => {
                let awaited = self.driver.await_completion(&handle, cancel).await;
                (Some(handle), awaited)
            }
            Err(e) => (None, Err(e)),
        };

        match awaited {
            Ok(result) => SubmissionOutcome {
                devices,
                tests_submitted,
                handle,
                status: Some(result.status),
                error: None,
                failures: failures_from_result(&targeted, &result),
            },
            Err(e) => {
                log::warn!(
                    "Submission for {} did not complete; keeping its tests as failing: {}",
                    describe_devices(&devices),
                    e
                );
                SubmissionOutcome {
                    devices,
                    tests_submitted,
                    handle,
                    status: None,
                    error: Some(e.to_string()),
                    failures: targeted.into_iter().collect(),
                }
            }
        }
    }
}

/// Failures per targeted device, never outside what that device was sent.
///
/// A device that did not pass but whose failures cannot be pinned down
/// (no report, or nothing reconcilable) keeps everything it was sent.
fn failures_from_result(targeted: &Targeted, result: &RunResult) -> RetryState {
    targeted
        .iter()
        .map(|(device, submitted)| {
            let reported = result
                .failures_by_device
                .get(device)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let reconciled = reconcile(device, submitted, reported);

            let device_status = result.device_status.get(device).copied();
            let passed = match device_status {
                Some(status) => status == RunStatus::Passed,
                None => result.status == RunStatus::Passed,
            };
            let unreported = result.unreported_devices.contains(device);

            let failures = if passed {
                reconciled
            } else if reconciled.is_empty() || unreported {
                log::warn!(
                    "{} finished {} without usable failure details; keeping all {} submitted class(es)",
                    device,
                    device_status.unwrap_or(result.status),
                    submitted.len()
                );
                submitted.clone()
            } else {
                reconciled
            };
            (device.clone(), failures)
        })
        .collect()
}

/// Map reported names onto submitted identifiers.
///
/// Exact matches win; otherwise a report naming only the simple class name
/// matches submitted identifiers with that simple name. Names matching
/// nothing submitted are dropped.
fn reconcile(
    device: &DeviceTarget,
    submitted: &[TestIdentifier],
    reported: &[TestIdentifier],
) -> Vec<TestIdentifier> {
    let mut matched = BTreeSet::new();
    for name in reported {
        if submitted.contains(name) {
            matched.insert(name.clone());
            continue;
        }
        let by_simple_name: Vec<&TestIdentifier> = submitted
            .iter()
            .filter(|s| s.simple_name() == name.simple_name())
            .collect();
        if by_simple_name.is_empty() {
            log::warn!("{} reported failure of '{}', which was not submitted; ignoring", device, name);
        }
        matched.extend(by_simple_name.into_iter().cloned());
    }
    matched.into_iter().collect()
}

fn describe_devices(devices: &[DeviceTarget]) -> String {
    match devices {
        [single] => single.to_string(),
        many => format!("{} devices", many.len()),
    }
}
