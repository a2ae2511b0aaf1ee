//! Scripted in-memory execution service shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use device_farm_orchestrator::error::{Result, ServiceError};
use device_farm_orchestrator::{
    ArtifactKind, ArtifactReference, ArtifactSet, DeviceSession, DeviceTarget, ExecutionService,
    RunHandle, RunRequest, RunStatus, RunStatusReport, SessionId, TestIdentifier,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

/// Decides which submitted tests fail: `(submission index, device, submitted) -> failing`
pub type FailureScript =
    Box<dyn Fn(usize, &DeviceTarget, &[TestIdentifier]) -> Vec<TestIdentifier> + Send + Sync>;

#[derive(Default)]
struct Build {
    polls: u32,
    stalled: bool,
    sessions: Vec<(DeviceTarget, Vec<TestIdentifier>)>,
}

#[derive(Default)]
struct State {
    submissions: Vec<RunRequest>,
    builds: HashMap<String, Build>,
    status_queries: u32,
    transient_errors: u32,
}

pub struct ScriptedService {
    script: FailureScript,
    rejected: BTreeSet<usize>,
    stalled: BTreeSet<usize>,
    running_polls: u32,
    unauthorized: bool,
    report_simple_names: bool,
    unreportable: bool,
    state: Mutex<State>,
}

impl ScriptedService {
    pub fn new(
        script: impl Fn(usize, &DeviceTarget, &[TestIdentifier]) -> Vec<TestIdentifier>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            rejected: BTreeSet::new(),
            stalled: BTreeSet::new(),
            running_polls: 1,
            unauthorized: false,
            report_simple_names: false,
            unreportable: false,
            state: Mutex::new(State::default()),
        }
    }

    /// Everything passes
    pub fn passing() -> Self {
        Self::new(|_, _, _| Vec::new())
    }

    /// Reject the submission with this index
    pub fn reject_submission(mut self, index: usize) -> Self {
        self.rejected.insert(index);
        self
    }

    /// The build from the submission with this index never leaves `running`
    pub fn stall_submission(mut self, index: usize) -> Self {
        self.stalled.insert(index);
        self
    }

    /// Report `running` this many times before the terminal status
    pub fn running_polls(mut self, polls: u32) -> Self {
        self.running_polls = polls;
        self
    }

    /// Fail this many status queries with a transport error first
    pub fn transient_errors(self, count: u32) -> Self {
        self.state.lock().unwrap().transient_errors = count;
        self
    }

    /// Every status query is rejected as unauthorized
    pub fn unauthorized(mut self) -> Self {
        self.unauthorized = true;
        self
    }

    /// Failure reports name classes without their package
    pub fn report_simple_names(mut self) -> Self {
        self.report_simple_names = true;
        self
    }

    /// Failure reports always fail with a parse error
    pub fn unreportable(mut self) -> Self {
        self.unreportable = true;
        self
    }

    pub fn submissions(&self) -> Vec<RunRequest> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn status_queries(&self) -> u32 {
        self.state.lock().unwrap().status_queries
    }
}

#[async_trait]
impl ExecutionService for ScriptedService {
    async fn upload_artifact(
        &self,
        kind: ArtifactKind,
        file_name: &str,
        _content: Bytes,
    ) -> Result<ArtifactReference> {
        Ok(ArtifactReference::new(format!("bs://{}-{}", kind, file_name)))
    }

    async fn submit_run(&self, request: &RunRequest) -> Result<RunHandle> {
        let mut state = self.state.lock().unwrap();
        let index = state.submissions.len();
        state.submissions.push(request.clone());

        if self.rejected.contains(&index) {
            return Err(ServiceError::Submission {
                reason: "parallel limit reached".to_string(),
            }
            .into());
        }

        let submitted = request.selection.tests();
        let sessions = request
            .devices
            .iter()
            .map(|device| (device.clone(), (self.script)(index, device, &submitted)))
            .collect();

        let handle = format!("build-{}", index);
        state.builds.insert(
            handle.clone(),
            Build {
                polls: 0,
                stalled: self.stalled.contains(&index),
                sessions,
            },
        );
        Ok(RunHandle::new(handle))
    }

    async fn get_run_status(&self, handle: &RunHandle) -> Result<RunStatusReport> {
        if self.unauthorized {
            return Err(ServiceError::Unauthorized {
                endpoint: "builds".to_string(),
            }
            .into());
        }

        let mut state = self.state.lock().unwrap();
        state.status_queries += 1;
        if state.transient_errors > 0 {
            state.transient_errors -= 1;
            return Err(ServiceError::Transport {
                endpoint: "builds".to_string(),
                reason: "connection reset".to_string(),
            }
            .into());
        }

        let build = state
            .builds
            .get_mut(handle.as_str())
            .ok_or_else(|| ServiceError::Http {
                endpoint: "builds".to_string(),
                status: 404,
                message: "no such build".to_string(),
            })?;
        build.polls += 1;

        if build.stalled || build.polls <= self.running_polls {
            return Ok(RunStatusReport {
                status: RunStatus::Running,
                sessions: Vec::new(),
            });
        }

        let sessions: Vec<DeviceSession> = build
            .sessions
            .iter()
            .enumerate()
            .map(|(i, (device, failing))| DeviceSession {
                device: device.clone(),
                session_id: SessionId::new(format!("{}-{}", handle, i)),
                status: if failing.is_empty() {
                    RunStatus::Passed
                } else {
                    RunStatus::Failed
                },
            })
            .collect();
        let status = if sessions.iter().all(|s| s.status == RunStatus::Passed) {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        };
        Ok(RunStatusReport { status, sessions })
    }

    async fn get_failure_report(
        &self,
        handle: &RunHandle,
        session: &SessionId,
    ) -> Result<Vec<TestIdentifier>> {
        if self.unreportable {
            return Err(ServiceError::Http {
                endpoint: "sessions".to_string(),
                status: 404,
                message: "session not found".to_string(),
            }
            .into());
        }

        let state = self.state.lock().unwrap();
        let index: usize = session
            .as_str()
            .rsplit('-')
            .next()
            .and_then(|i| i.parse().ok())
            .unwrap();
        let failing = &state.builds[handle.as_str()].sessions[index].1;
        Ok(failing
            .iter()
            .map(|t| {
                if self.report_simple_names {
                    TestIdentifier::from(t.simple_name())
                } else {
                    t.clone()
                }
            })
            .collect())
    }
}

pub fn device(name: &str) -> DeviceTarget {
    DeviceTarget::parse(name).unwrap()
}

pub fn tests(names: &[&str]) -> Vec<TestIdentifier> {
    names.iter().map(|n| TestIdentifier::from(*n)).collect()
}

pub fn artifacts() -> ArtifactSet {
    ArtifactSet {
        app: ArtifactReference::from("bs://app"),
        test_suite: ArtifactReference::from("bs://suite"),
    }
}
