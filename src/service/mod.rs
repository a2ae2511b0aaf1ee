//! Remote execution service seam.
//!
//! The orchestrator only needs four operations from a device cloud. The
//! BrowserStack App Automate client implements them over HTTP; tests plug in
//! scripted implementations.

pub mod browserstack;

pub use browserstack::{BrowserStackClient, BrowserStackConfig};

use crate::error::Result;
use crate::model::{
    ArtifactKind, ArtifactReference, DeviceTarget, RunHandle, RunRequest, RunStatus, SessionId,
    TestIdentifier,
};
use async_trait::async_trait;
use bytes::Bytes;

/// One device session inside a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSession {
    /// Device the session ran on
    pub device: DeviceTarget,
    /// Session id for failure lookups
    pub session_id: SessionId,
    /// Session status
    pub status: RunStatus,
}

/// Snapshot of a run's progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatusReport {
    /// Overall run status
    pub status: RunStatus,
    /// Sessions known so far; a device has one session per shard
    pub sessions: Vec<DeviceSession>,
}

/// Operations the orchestrator requires from a remote device cloud
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Upload an artifact. Uploading identical content twice yields the same reference.
    async fn upload_artifact(
        &self,
        kind: ArtifactKind,
        file_name: &str,
        content: Bytes,
    ) -> Result<ArtifactReference>;

    /// Submit a run. Fails with a submission error when rejected or when no handle comes back.
    async fn submit_run(&self, request: &RunRequest) -> Result<RunHandle>;

    /// Query current status and per-device sessions
    async fn get_run_status(&self, handle: &RunHandle) -> Result<RunStatusReport>;

    /// Test classes that failed in one device session
    async fn get_failure_report(
        &self,
        handle: &RunHandle,
        session: &SessionId,
    ) -> Result<Vec<TestIdentifier>>;
}
