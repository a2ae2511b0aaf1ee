//! Run command implementation.
//!
//! Uploads the artifacts, runs the sharded suite on every device, retries
//! failing classes and reports what is still failing.

use super::helpers::{artifact_name, browserstack_config, load_tests, parse_devices};
use super::retry::retry_with_backoff;
use crate::cli::RuntimeConfig;
use crate::cli::args::RunArgs;
use crate::driver::{PollConfig, RemoteRunDriver};
use crate::error::{CliError, Result};
use crate::model::{ArtifactKind, ArtifactReference, ArtifactSet, RunOptions};
use crate::report::{ReportContext, RunReport, save_report};
use crate::retry::RetryController;
use crate::service::{BrowserStackClient, ExecutionService};
use crate::shard;
use anyhow::Context;
use bytes::Bytes;
use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Execute run command
pub(super) async fn execute_run(args: &RunArgs, config: &RuntimeConfig) -> Result<i32> {
    let started_at = Utc::now();

    for (flag, path) in [("--app", &args.app), ("--test-suite", &args.test_suite)] {
        if !path.is_file() {
            return Err(CliError::InvalidArguments {
                reason: format!("{} {} is not a file", flag, path.display()),
            }
            .into());
        }
    }

    let devices = parse_devices(&args.devices)?;
    let tests = load_tests(&args.tests).await?;
    let shards = shard::plan(tests.iter().cloned(), args.shards)?;
    let total_tests: usize = shards.iter().map(|s| s.len()).sum();

    config.section("Planning");
    config.println(&format!(
        "{} test class(es) in {} shard(s) on {} device(s), up to {} retry round(s)",
        total_tests,
        shards.len(),
        devices.len(),
        args.max_retries
    ));
    for device in &devices {
        config.verbose_println(&format!("device: {}", device));
    }

    let client = BrowserStackClient::new(browserstack_config(&args.credentials)?)?;

    config.section("Uploading");
    let app = upload(&client, ArtifactKind::App, &args.app, config).await?;
    let test_suite = upload(&client, ArtifactKind::TestSuite, &args.test_suite, config).await?;

    let poll = PollConfig {
        interval: Duration::from_secs(args.poll_interval_secs),
        timeout: (args.timeout_mins > 0).then(|| Duration::from_secs(args.timeout_mins * 60)),
        report_retries: config.retry().failure_reports,
    };
    let options = RunOptions {
        project: args.project.clone(),
        build_tag: args.build_tag.clone(),
        is_retry_attempt: false,
        device_logs: args.device_logs,
    };
    let controller = RetryController::new(
        RemoteRunDriver::new(client, poll),
        ArtifactSet { app, test_suite },
        options,
    );

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted; finishing the current round and stopping");
                cancel.cancel();
            }
        })
    };

    config.section("Running");
    let outcome = controller
        .run(&shards, &devices, args.max_retries, &cancel)
        .await;
    interrupt.abort();
    let result = outcome?;

    let report = RunReport::new(
        ReportContext {
            started_at,
            devices: devices.clone(),
            total_tests,
            shard_count: shards.len(),
            max_retries: args.max_retries,
        },
        result,
    );

    config.section("Result");
    for device in &devices {
        match report.remaining_failures.get(device) {
            None => config.success_println(&format!("{}: all tests passed", device)),
            Some(failing) => {
                config.error_println(&format!(
                    "{}: {} class(es) still failing",
                    device,
                    failing.len()
                ));
                for test in failing {
                    config.indent(test.as_str());
                }
            }
        }
    }

    if let Some(path) = &args.report {
        let bytes = save_report(path, &report)?;
        config.verbose_println(&format!("Wrote {} bytes to {}", bytes, path.display()));
        config.println(&format!("Report: {}", path.display()));
    }

    if cancel.is_cancelled() {
        config.warning_println("Run was interrupted; remaining retry rounds were skipped");
    }

    if report.overall_passed {
        config.success_println(&report.summary());
        Ok(0)
    } else {
        config.error_println(&report.summary());
        Ok(1)
    }
}

/// Read an artifact from disk and upload it with retries
async fn upload(
    client: &BrowserStackClient,
    kind: ArtifactKind,
    path: &Path,
    config: &RuntimeConfig,
) -> Result<ArtifactReference> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {} from {}", kind, path.display()))?;
    let content = Bytes::from(content);
    let name = artifact_name(path);

    config.progress_println(&format!("Uploading {} {}", kind, name));
    let reference = retry_with_backoff(
        || client.upload_artifact(kind, &name, content.clone()),
        config.retry().file_uploads,
        &format!("Upload of {}", name),
        config,
        None,
    )
    .await?;
    config.success_println(&format!("{} uploaded: {}", kind, reference));
    Ok(reference)
}
