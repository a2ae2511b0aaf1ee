//! Report command implementation.
//!
//! Displays a run report saved by `run --report`.

use crate::cli::RuntimeConfig;
use crate::cli::args::ReportArgs;
use crate::error::Result;
use crate::report::load_report;

/// Execute report command
pub(super) async fn execute_report(args: &ReportArgs, config: &RuntimeConfig) -> Result<i32> {
    let report = load_report(&args.path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        config.println(&report.summary());
        config.println(&format!("Report ID: {}", report.report_id));
        config.println(&format!("Started: {}", report.started_at));
        config.println(&format!("Elapsed: {}s", report.elapsed().num_seconds()));

        for round in &report.rounds {
            let label = if round.round == 0 {
                "Initial run".to_string()
            } else {
                format!("Retry {}", round.round)
            };
            config.section(&label);
            for submission in &round.submissions {
                let handle = submission
                    .handle
                    .as_ref()
                    .map(|h| h.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let outcome = match (&submission.status, &submission.error) {
                    (_, Some(error)) => format!("error: {}", error),
                    (Some(status), None) => status.to_string(),
                    (None, None) => "unknown".to_string(),
                };
                config.println(&format!(
                    "build {} on {} device(s), {} class(es): {}",
                    handle,
                    submission.devices.len(),
                    submission.tests_submitted,
                    outcome
                ));
            }
            config.indent(&format!(
                "{} failing class(es) outstanding",
                round.outstanding.failure_count()
            ));
        }

        if !report.remaining_failures.is_empty() {
            config.section("Remaining failures");
            for (device, failing) in report.remaining_failures.iter() {
                config.println(&device.to_string());
                for test in failing {
                    config.indent(test.as_str());
                }
            }
        }
    }

    Ok(if report.overall_passed { 0 } else { 1 })
}
