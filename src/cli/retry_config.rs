//! Retry configuration for network operations.
//!
//! Provides configurable retry limits for uploads and failure report
//! lookups, allowing CI to tune retry behavior based on network conditions.

/// Upper bound for upload retries
const MAX_UPLOAD_RETRIES: u32 = 20;

/// Upper bound for failure report retries
const MAX_REPORT_RETRIES: u32 = 10;

/// Configuration for retry behavior across different operation types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Max retries for artifact uploads (app and test suite)
    pub file_uploads: u32,

    /// Max retries per failure report fetch after a run finishes
    pub failure_reports: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            file_uploads: 5,    // Higher - most network-dependent
            failure_reports: 3, // Conservative - run already finished
        }
    }
}

impl RetryConfig {
    /// Parse a retry count, clamping to `max` and falling back to `default`
    fn parse_retry_value(raw: Option<&str>, default: u32, max: u32) -> u32 {
        raw.and_then(|s| s.trim().parse::<u32>().ok())
            .map(|v| v.min(max))
            .unwrap_or(default)
    }

    /// Create config from environment variables with fallback to defaults
    ///
    /// - `DEVICE_FARM_RETRY_UPLOADS` (default 5, max 20)
    /// - `DEVICE_FARM_RETRY_REPORTS` (default 3, max 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            file_uploads: Self::parse_retry_value(
                std::env::var("DEVICE_FARM_RETRY_UPLOADS").ok().as_deref(),
                defaults.file_uploads,
                MAX_UPLOAD_RETRIES,
            ),
            failure_reports: Self::parse_retry_value(
                std::env::var("DEVICE_FARM_RETRY_REPORTS").ok().as_deref(),
                defaults.failure_reports,
                MAX_REPORT_RETRIES,
            ),
        }
    }
}
