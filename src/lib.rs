//! # Device Farm Orchestrator
//!
//! Sharded instrumentation test runs on a remote device cloud, with bounded
//! failure-only retries.
//!
//! A run uploads the application and its test suite once, executes the full
//! test list split into shards on every device of the matrix, then resubmits
//! only the failing test classes, one narrowed run per still-failing device,
//! until everything passes or the retry budget is spent.
//!
//! ## Features
//!
//! - **Deterministic sharding**: Balanced, order-independent shard plans
//! - **Failure-only retries**: Each device reruns exactly what failed on it
//! - **Resilient polling**: Transient status errors never abort a wait
//! - **Run reports**: Atomic JSON reports for CI artifacts
//!
//! ## Usage
//!
//! ```bash
//! device_farm_orchestrator plan --tests-file tests.json --shards 4
//! device_farm_orchestrator run --app app.apk --test-suite tests.apk \
//!     --device 'Google Pixel 3-9.0' --tests-file tests.json --max-retries 1
//! device_farm_orchestrator status <BUILD_ID> --failures
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod cli;
pub mod driver;
pub mod error;
pub mod model;
pub mod report;
pub mod retry;
pub mod service;
pub mod shard;

// Re-export main types for public API
pub use cli::Args;
pub use driver::{PollConfig, RemoteRunDriver};
pub use error::{OrchestratorError, Result};
pub use model::{
    ArtifactKind, ArtifactReference, ArtifactSet, DeviceTarget, RetryState, RunHandle, RunOptions,
    RunRequest, RunResult, RunStatus, SessionId, Shard, TestIdentifier, TestSelection,
};
pub use report::{RunReport, load_report, save_report};
pub use retry::{FinalResult, RetryController};
pub use service::{
    BrowserStackClient, BrowserStackConfig, DeviceSession, ExecutionService, RunStatusReport,
};
