//! Status command implementation.
//!
//! One-shot query of a submitted build, optionally with per-session failures.

use super::helpers::browserstack_config;
use super::retry::retry_with_backoff;
use crate::cli::RuntimeConfig;
use crate::cli::args::StatusArgs;
use crate::error::Result;
use crate::model::{RunHandle, RunStatus};
use crate::service::{BrowserStackClient, ExecutionService};

/// Execute status command
pub(super) async fn execute_status(args: &StatusArgs, config: &RuntimeConfig) -> Result<i32> {
    let client = BrowserStackClient::new(browserstack_config(&args.credentials)?)?;
    let handle = RunHandle::new(args.build_id.trim());

    config.verbose_println(&format!("Querying build {}...", handle));
    let report = client.get_run_status(&handle).await?;

    config.println(&format!("Build {}: {}", handle, report.status));
    for session in &report.sessions {
        config.indent(&format!(
            "{} [{}] session {}",
            session.device, session.status, session.session_id
        ));

        if args.failures && session.status.is_terminal() && session.status != RunStatus::Passed {
            let failed = retry_with_backoff(
                || client.get_failure_report(&handle, &session.session_id),
                config.retry().failure_reports,
                "Failure report",
                config,
                None,
            )
            .await?;
            for test in failed {
                config.indent(&format!("  ✗ {}", test));
            }
        }
    }

    let exit_code = match report.status {
        RunStatus::Passed => 0,
        status if status.is_terminal() => 1,
        _ => 0,
    };
    Ok(exit_code)
}
