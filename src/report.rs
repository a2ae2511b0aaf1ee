//! Run report aggregation and persistence.
//!
//! A report captures one orchestrated run end to end: what was planned,
//! every round's submissions, and the failures still outstanding. Reports
//! are written atomically (temp file, fsync, rename) so CI never picks up a
//! half-written file.

use crate::error::{ReportError, Result};
use crate::model::{DeviceTarget, RetryState};
use crate::retry::{FinalResult, RoundReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Current version of the report format
pub const REPORT_FORMAT_VERSION: u32 = 1;

/// Persisted summary of one orchestrated run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Version of the report format
    pub format_version: u32,
    /// Unique ID for this run
    pub report_id: uuid::Uuid,
    /// When orchestration started
    pub started_at: DateTime<Utc>,
    /// When orchestration finished
    pub finished_at: DateTime<Utc>,
    /// Devices in the matrix
    pub devices: Vec<DeviceTarget>,
    /// Total test classes planned
    pub total_tests: usize,
    /// Shards in the initial plan
    pub shard_count: usize,
    /// Retry budget
    pub max_retries: u32,
    /// Retry rounds used
    pub retries_used: u32,
    /// Whether everything passed in the end
    pub overall_passed: bool,
    /// Failures still outstanding per device
    pub remaining_failures: RetryState,
    /// Per-round history
    pub rounds: Vec<RoundReport>,
}

/// Planning inputs recorded next to the result
#[derive(Debug, Clone)]
pub struct ReportContext {
    /// When orchestration started
    pub started_at: DateTime<Utc>,
    /// Devices in the matrix
    pub devices: Vec<DeviceTarget>,
    /// Total test classes planned
    pub total_tests: usize,
    /// Shards in the initial plan
    pub shard_count: usize,
    /// Retry budget
    pub max_retries: u32,
}

impl RunReport {
    /// Build a report from a finished run
    pub fn new(context: ReportContext, result: FinalResult) -> Self {
        Self {
            format_version: REPORT_FORMAT_VERSION,
            report_id: uuid::Uuid::new_v4(),
            started_at: context.started_at,
            finished_at: Utc::now(),
            devices: context.devices,
            total_tests: context.total_tests,
            shard_count: context.shard_count,
            max_retries: context.max_retries,
            retries_used: result.retries_used,
            overall_passed: result.overall_passed,
            remaining_failures: result.remaining_failures,
            rounds: result.rounds,
        }
    }

    /// Wall-clock duration of the run
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        if self.overall_passed {
            format!(
                "PASSED: {} test class(es) on {} device(s) after {} retry round(s)",
                self.total_tests,
                self.devices.len(),
                self.retries_used
            )
        } else {
            format!(
                "FAILED: {} class failure(s) on {} of {} device(s) after {} retry round(s)",
                self.remaining_failures.failure_count(),
                self.remaining_failures.device_count(),
                self.devices.len(),
                self.retries_used
            )
        }
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.format_version != REPORT_FORMAT_VERSION {
            return Err(ReportError::Corrupted {
                reason: format!(
                    "unsupported format version {} (expected {})",
                    self.format_version, REPORT_FORMAT_VERSION
                ),
            }
            .into());
        }
        if self.overall_passed != self.remaining_failures.is_empty() {
            return Err(ReportError::Corrupted {
                reason: "overall_passed disagrees with remaining_failures".to_string(),
            }
            .into());
        }
        if self.retries_used > self.max_retries {
            return Err(ReportError::Corrupted {
                reason: format!(
                    "retries_used {} exceeds max_retries {}",
                    self.retries_used, self.max_retries
                ),
            }
            .into());
        }
        if self.finished_at < self.started_at {
            return Err(ReportError::Corrupted {
                reason: "finished_at precedes started_at".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Write a report atomically
pub fn save_report(path: &Path, report: &RunReport) -> Result<u64> {
    report.validate()?;

    let serialized = serde_json::to_string_pretty(report).map_err(|e| ReportError::SaveFailed {
        reason: format!("Failed to serialize report: {}", e),
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| ReportError::SaveFailed {
            reason: format!("Failed to create {}: {}", parent.display(), e),
        })?;
    }

    let temp_file_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_file_path).map_err(|e| ReportError::SaveFailed {
            reason: format!("Failed to create temp file: {}", e),
        })?;

        file.write_all(serialized.as_bytes())
            .map_err(|e| ReportError::SaveFailed {
                reason: format!("Failed to write report: {}", e),
            })?;

        file.sync_all().map_err(|e| ReportError::SaveFailed {
            reason: format!("Failed to sync file: {}", e),
        })?;
    }

    fs::rename(&temp_file_path, path).map_err(|e| ReportError::SaveFailed {
        reason: format!("Failed to rename temp file: {}", e),
    })?;

    log::debug!("report {} written to {}", report.report_id, path.display());
    Ok(serialized.len() as u64)
}

/// Read and validate a report
pub fn load_report(path: &Path) -> Result<RunReport> {
    let content = fs::read_to_string(path).map_err(|e| ReportError::LoadFailed {
        reason: format!("Failed to read {}: {}", path.display(), e),
    })?;

    let report: RunReport = serde_json::from_str(&content).map_err(|e| ReportError::Corrupted {
        reason: format!("Invalid report JSON: {}", e),
    })?;

    report.validate()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestIdentifier;

    fn report(passed: bool) -> RunReport {
        let device = DeviceTarget::parse("Google Pixel 3-9.0").unwrap();
        let mut remaining = RetryState::new();
        if !passed {
            remaining.record(device.clone(), vec![TestIdentifier::from("T3")]);
        }
        RunReport::new(
            ReportContext {
                started_at: Utc::now(),
                devices: vec![device],
                total_tests: 4,
                shard_count: 2,
                max_retries: 1,
            },
            FinalResult {
                overall_passed: passed,
                remaining_failures: remaining,
                retries_used: 1,
                rounds: Vec::new(),
            },
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");

        let original = report(false);
        save_report(&path, &original).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded = load_report(&path).unwrap();
        assert_eq!(loaded.report_id, original.report_id);
        assert_eq!(loaded.remaining_failures, original.remaining_failures);
        assert!(!loaded.overall_passed);
    }

    #[test]
    fn test_inconsistent_report_is_rejected() {
        let mut bad = report(true);
        bad.remaining_failures.record(
            DeviceTarget::parse("Google Pixel 3-9.0").unwrap(),
            vec![TestIdentifier::from("T1")],
        );
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_garbage_file_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_report(&path),
            Err(crate::error::OrchestratorError::Report(ReportError::Corrupted { .. }))
        ));
    }

    #[test]
    fn test_summary_wording() {
        assert!(report(true).summary().starts_with("PASSED"));
        assert!(report(false).summary().contains("1 class failure(s) on 1 of 1 device(s)"));
    }
}
