//! Error types for device_farm_orchestrator operations.
//!
//! This module defines all error types with actionable error messages and recovery suggestions.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for device_farm_orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Main error type for all device_farm_orchestrator operations
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Invalid run configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Remote execution service errors
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Run lifecycle errors (timeout, cancellation)
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    /// Report persistence errors
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Configuration errors. Always fatal, never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Shard count must be at least one
    #[error("Shard count must be at least 1, got {count}")]
    InvalidShardCount {
        /// Requested shard count
        count: usize,
    },

    /// No device targets were given
    #[error("At least one device target is required")]
    NoDevices,

    /// The plan contains no tests
    #[error("The shard plan contains no tests")]
    NoTests,

    /// Device target string is unusable
    #[error("Invalid device target '{device}': {reason}")]
    InvalidDevice {
        /// Raw device string
        device: String,
        /// Reason for the error
        reason: String,
    },

    /// Service base URL cannot be parsed
    #[error("Invalid API URL '{url}': {reason}")]
    InvalidApiUrl {
        /// Raw URL
        url: String,
        /// Reason for the error
        reason: String,
    },

    /// Service credentials were not provided
    #[error("Missing credentials: {variable} is not set")]
    MissingCredentials {
        /// Environment variable or flag that should carry the value
        variable: String,
    },

    /// Test list could not be read or is empty
    #[error("Invalid test list{}: {reason}", path.as_ref().map(|p| format!(" at {}", p.display())).unwrap_or_default())]
    InvalidTestList {
        /// Source file, if the list came from disk
        path: Option<PathBuf>,
        /// Reason for the error
        reason: String,
    },
}

/// Errors reported by the remote execution service or its transport
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Artifact upload failed
    #[error("Upload of '{artifact}' failed: {reason}")]
    Upload {
        /// Artifact file name
        artifact: String,
        /// Reason for the error
        reason: String,
        /// Whether the failure was transient
        retryable: bool,
    },

    /// The service rejected the run or returned no handle
    #[error("Run submission rejected: {reason}")]
    Submission {
        /// Reason for the error
        reason: String,
    },

    /// Response body was missing fields or malformed
    #[error("Malformed response from {endpoint}: {reason}")]
    Parse {
        /// Endpoint that produced the response
        endpoint: String,
        /// Reason for the error
        reason: String,
    },

    /// Network-level failure
    #[error("Request to {endpoint} failed: {reason}")]
    Transport {
        /// Endpoint that was called
        endpoint: String,
        /// Reason for the error
        reason: String,
    },

    /// Non-success HTTP status
    #[error("{endpoint} returned HTTP {status}: {message}")]
    Http {
        /// Endpoint that was called
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Response message, if any
        message: String,
    },

    /// Credentials rejected
    #[error("Authentication rejected by {endpoint}. Check BROWSERSTACK_USERNAME and BROWSERSTACK_ACCESS_KEY.")]
    Unauthorized {
        /// Endpoint that was called
        endpoint: String,
    },
}

impl ServiceError {
    /// Whether retrying the same call may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            ServiceError::Transport { .. } | ServiceError::Parse { .. } => true,
            ServiceError::Http { status, .. } => *status >= 500 || *status == 429,
            ServiceError::Upload { retryable, .. } => *retryable,
            ServiceError::Submission { .. } | ServiceError::Unauthorized { .. } => false,
        }
    }
}

/// Errors ending a wait on a remote run. The remote job itself keeps running.
#[derive(Error, Debug)]
pub enum RunError {
    /// Poll ceiling elapsed before a terminal status was seen
    #[error("Run {handle} did not finish within {elapsed_secs}s")]
    Timeout {
        /// Run handle
        handle: String,
        /// Seconds spent waiting
        elapsed_secs: u64,
    },

    /// Wait was cancelled by the caller
    #[error("Waiting on run {handle} was cancelled")]
    Cancelled {
        /// Run handle
        handle: String,
    },
}

/// Report persistence errors
#[derive(Error, Debug)]
pub enum ReportError {
    /// Failed to save report
    #[error("Failed to save report: {reason}")]
    SaveFailed {
        /// Reason for the error
        reason: String,
    },

    /// Failed to load report
    #[error("Failed to load report: {reason}")]
    LoadFailed {
        /// Reason for the error
        reason: String,
    },

    /// Report file is inconsistent
    #[error("Report file corrupted: {reason}")]
    Corrupted {
        /// Reason for the error
        reason: String,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl OrchestratorError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            OrchestratorError::Config(ConfigError::MissingCredentials { variable }) => vec![
                format!("Export {} before running", variable),
                "Or pass --username/--access-key explicitly".to_string(),
            ],
            OrchestratorError::Config(ConfigError::InvalidDevice { .. }) => vec![
                "Use the '<model>-<os version>' form, e.g. 'Google Pixel 3-9.0'".to_string(),
            ],
            OrchestratorError::Config(ConfigError::InvalidTestList { .. }) => vec![
                "Provide a JSON array of test class names via --tests-file".to_string(),
                "Or pass classes directly with --test".to_string(),
            ],
            OrchestratorError::Service(ServiceError::Unauthorized { .. }) => vec![
                "Verify the access key in the BrowserStack account settings".to_string(),
            ],
            OrchestratorError::Service(ServiceError::Http { status: 429, .. }) => vec![
                "Parallel session limit reached; retry after running builds finish".to_string(),
            ],
            OrchestratorError::Run(RunError::Timeout { handle, .. })
            | OrchestratorError::Run(RunError::Cancelled { handle }) => vec![
                format!("The remote build keeps running; check it with: status {}", handle),
                "Raise --timeout-mins if builds regularly take longer".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            OrchestratorError::Service(e) => e.is_recoverable(),
            OrchestratorError::Io(_) => true,
            _ => false,
        }
    }
}
