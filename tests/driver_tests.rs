//! Poll loop behaviour of the remote run driver.

mod support;

use device_farm_orchestrator::error::{OrchestratorError, RunError, ServiceError};
use device_farm_orchestrator::shard;
use device_farm_orchestrator::{
    ExecutionService, PollConfig, RemoteRunDriver, RunOptions, RunRequest, RunStatus, TestSelection,
};
use std::time::Duration;
use support::{ScriptedService, artifacts, device, tests};
use tokio_util::sync::CancellationToken;

fn poll(timeout: Option<Duration>) -> PollConfig {
    PollConfig {
        interval: Duration::from_secs(60),
        timeout,
        report_retries: 2,
    }
}

fn request() -> RunRequest {
    RunRequest {
        artifacts: artifacts(),
        devices: vec![device("Google Pixel 3-9.0"), device("Samsung Galaxy S20-10.0")],
        selection: TestSelection::Shards(shard::plan(tests(&["T1", "T2", "T3"]), 2).unwrap()),
        options: RunOptions::default(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_polls_until_terminal() {
    let pixel = device("Google Pixel 3-9.0");
    let failing_device = pixel.clone();
    let service = ScriptedService::new(move |_, device, _| {
        if *device == failing_device {
            tests(&["T2"])
        } else {
            Vec::new()
        }
    })
    .running_polls(3);
    let driver = RemoteRunDriver::new(service, poll(None));

    let handle = driver.submit(&request()).await.unwrap();
    let result = driver
        .await_completion(&handle, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(driver.service().status_queries(), 4);
    assert_eq!(result.handle, handle);
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failures_by_device[&pixel], tests(&["T2"]));
    assert_eq!(result.device_status[&pixel], RunStatus::Failed);
    assert_eq!(
        result.device_status[&device("Samsung Galaxy S20-10.0")],
        RunStatus::Passed
    );
    assert!(result.unreported_devices.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transient_status_errors_are_swallowed() {
    let service = ScriptedService::passing().transient_errors(5);
    let driver = RemoteRunDriver::new(service, poll(None));

    let handle = driver.submit(&request()).await.unwrap();
    let result = driver
        .await_completion(&handle, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Passed);
    assert!(driver.service().status_queries() >= 6);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_is_not_retried() {
    let service = ScriptedService::passing().unauthorized();
    let driver = RemoteRunDriver::new(service, poll(None));

    let handle = driver.submit(&request()).await.unwrap();
    let err = driver
        .await_completion(&handle, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Service(ServiceError::Unauthorized { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_hard_timeout() {
    let service = ScriptedService::passing().running_polls(u32::MAX);
    let driver = RemoteRunDriver::new(service, poll(Some(Duration::from_secs(300))));

    let handle = driver.submit(&request()).await.unwrap();
    let err = driver
        .await_completion(&handle, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        OrchestratorError::Run(RunError::Timeout {
            handle: timed_out, ..
        }) => assert_eq!(timed_out, handle.to_string()),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(driver.service().status_queries(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_leaves_run_queryable() {
    let service = ScriptedService::passing().running_polls(u32::MAX);
    let driver = RemoteRunDriver::new(service, poll(None));
    let handle = driver.submit(&request()).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(150)).await;
        trigger.cancel();
    });

    let err = driver.await_completion(&handle, &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Run(RunError::Cancelled { .. })
    ));
    assert_eq!(driver.service().status_queries(), 2);

    // The remote build is untouched and can still be queried
    let report = driver.service().get_run_status(&handle).await.unwrap();
    assert_eq!(report.status, RunStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn test_unreportable_sessions_are_flagged() {
    let service = ScriptedService::new(|_, _, submitted| submitted.to_vec()).unreportable();
    let driver = RemoteRunDriver::new(service, poll(None));

    let handle = driver.submit(&request()).await.unwrap();
    let result = driver
        .await_completion(&handle, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.unreported_devices.len(), 2);
}
