//! Core data model shared by the planner, driver and retry controller.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string-like value
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// One test class, e.g. `com.stripe.android.lpm.TestCard`
    TestIdentifier
);

string_id!(
    /// Reference to an uploaded artifact, e.g. `bs://527636cd...`
    ArtifactReference
);

string_id!(
    /// Remote run (build) identifier
    RunHandle
);

string_id!(
    /// One device session inside a run
    SessionId
);

impl TestIdentifier {
    /// Class name without its package prefix
    pub fn simple_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

/// Execution environment: `<model>-<os version>`, e.g. `Google Pixel 3-9.0`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceTarget(String);

impl DeviceTarget {
    /// Parse and validate a device target string
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidDevice {
                device: raw.to_string(),
                reason: "device name is empty".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Build from the model and OS version reported by the service
    pub fn from_parts(model: &str, os_version: &str) -> Self {
        if os_version.is_empty() {
            Self(model.to_string())
        } else {
            Self(format!("{}-{}", model, os_version))
        }
    }

    /// Borrow the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named ordered group of tests assigned to one execution slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Shard name (`Shard 1`, `Shard 2`, ...)
    pub name: String,
    /// Tests in this shard
    pub tests: Vec<TestIdentifier>,
}

impl Shard {
    /// Number of tests in the shard
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Whether the shard holds no tests
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// Which artifact an upload produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Application under test
    App,
    /// Instrumentation test suite
    TestSuite,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::App => f.write_str("app"),
            ArtifactKind::TestSuite => f.write_str("test suite"),
        }
    }
}

/// Uploaded artifacts every submission runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    /// Application under test
    pub app: ArtifactReference,
    /// Instrumentation test suite
    pub test_suite: ArtifactReference,
}

/// Tests to run in one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestSelection {
    /// Full plan split into shards
    Shards(Vec<Shard>),
    /// Explicit class filter, used for narrowed resubmissions
    ClassFilter(Vec<TestIdentifier>),
}

impl TestSelection {
    /// All tests this selection covers, in order
    pub fn tests(&self) -> Vec<TestIdentifier> {
        match self {
            TestSelection::Shards(shards) => {
                shards.iter().flat_map(|s| s.tests.iter().cloned()).collect()
            }
            TestSelection::ClassFilter(tests) => tests.clone(),
        }
    }
}

/// Per-submission options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Dashboard project name
    pub project: Option<String>,
    /// Build tag shown on the dashboard
    pub build_tag: Option<String>,
    /// Set on narrowed resubmissions
    pub is_retry_attempt: bool,
    /// Collect device logs
    pub device_logs: bool,
}

impl RunOptions {
    /// Copy of these options marked as a retry attempt
    pub fn for_retry(&self) -> Self {
        Self {
            is_retry_attempt: true,
            ..self.clone()
        }
    }
}

/// Everything needed for one submission attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Uploaded artifacts
    pub artifacts: ArtifactSet,
    /// Devices to run on
    pub devices: Vec<DeviceTarget>,
    /// Tests to run
    pub selection: TestSelection,
    /// Submission options
    pub options: RunOptions,
}

/// Remote run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Waiting for devices
    Queued,
    /// Executing
    Running,
    /// All tests passed
    Passed,
    /// At least one test failed
    Failed,
    /// Infrastructure or setup error
    Error,
    /// Service-side time limit hit
    Timedout,
    /// Stopped by a user
    Stopped,
}

impl RunStatus {
    /// Whether polling should stop
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Queued | RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Error => "error",
            RunStatus::Timedout => "timedout",
            RunStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Outcome of a run that reached terminal status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Run that produced this result
    pub handle: RunHandle,
    /// Terminal status
    pub status: RunStatus,
    /// Status per device; `passed` only when every session of the device passed
    pub device_status: BTreeMap<DeviceTarget, RunStatus>,
    /// Failed tests per device; devices without failures map to an empty list
    pub failures_by_device: BTreeMap<DeviceTarget, Vec<TestIdentifier>>,
    /// Devices whose failure report could not be fetched
    pub unreported_devices: BTreeSet<DeviceTarget>,
}

/// Outstanding failures per device. Empty means everything passed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryState(BTreeMap<DeviceTarget, Vec<TestIdentifier>>);

impl RetryState {
    /// Empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a device's failures, removing the device when the list is empty
    pub fn record(&mut self, device: DeviceTarget, failures: Vec<TestIdentifier>) {
        if failures.is_empty() {
            self.0.remove(&device);
        } else {
            self.0.insert(device, failures);
        }
    }

    /// Failures outstanding for a device
    pub fn get(&self, device: &DeviceTarget) -> Option<&[TestIdentifier]> {
        self.0.get(device).map(Vec::as_slice)
    }

    /// Whether no failures remain
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of devices with outstanding failures
    pub fn device_count(&self) -> usize {
        self.0.len()
    }

    /// Total outstanding failures across devices
    pub fn failure_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Iterate devices and their failures in device order
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceTarget, &Vec<TestIdentifier>)> {
        self.0.iter()
    }
}

impl FromIterator<(DeviceTarget, Vec<TestIdentifier>)> for RetryState {
    fn from_iter<I: IntoIterator<Item = (DeviceTarget, Vec<TestIdentifier>)>>(iter: I) -> Self {
        let mut state = RetryState::new();
        for (device, failures) in iter {
            state.record(device, failures);
        }
        state
    }
}
