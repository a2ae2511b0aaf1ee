//! BrowserStack App Automate (Espresso v2) request and response bodies.
//!
//! Responses are validated here, at the boundary. Anything missing or
//! malformed becomes a `ServiceError::Parse` instead of leaking into the
//! orchestration logic.

use crate::error::ServiceError;
use crate::model::{
    DeviceTarget, RunRequest, RunStatus, SessionId, Shard, TestIdentifier, TestSelection,
};
use crate::service::{DeviceSession, RunStatusReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Suffix appended to the build tag of narrowed resubmissions
pub const RERUN_TAG_SUFFIX: &str = "-rerun";

/// `POST /app-automate/upload`
#[derive(Debug, Deserialize)]
pub(crate) struct AppUploadResponse {
    pub app_url: String,
}

/// `POST /app-automate/espresso/test-suite`
#[derive(Debug, Deserialize)]
pub(crate) struct TestSuiteUploadResponse {
    #[serde(alias = "test_url")]
    pub test_suite_url: String,
}

/// `POST /app-automate/espresso/v2/build`
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BuildRequest {
    pub app: String,
    pub test_suite: String,
    pub devices: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shards: Option<ShardSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_tag: Option<String>,
    pub device_logs: bool,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ShardSpec {
    pub number_of_shards: usize,
    pub mapping: Vec<ShardMapping>,
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct ShardMapping {
    pub name: String,
    pub strategy: &'static str,
    pub values: Vec<String>,
}

impl From<&Shard> for ShardMapping {
    fn from(shard: &Shard) -> Self {
        Self {
            name: shard.name.clone(),
            strategy: "class",
            values: shard.tests.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl From<&RunRequest> for BuildRequest {
    fn from(request: &RunRequest) -> Self {
        let (shards, class) = match &request.selection {
            TestSelection::Shards(shards) => (
                Some(ShardSpec {
                    number_of_shards: shards.len(),
                    mapping: shards.iter().map(ShardMapping::from).collect(),
                }),
                None,
            ),
            TestSelection::ClassFilter(tests) => {
                (None, Some(tests.iter().map(|t| t.to_string()).collect()))
            }
        };

        let build_tag = match (&request.options.build_tag, request.options.is_retry_attempt) {
            (Some(tag), true) => Some(format!("{}{}", tag, RERUN_TAG_SUFFIX)),
            (Some(tag), false) => Some(tag.clone()),
            (None, true) => Some(RERUN_TAG_SUFFIX.trim_start_matches('-').to_string()),
            (None, false) => None,
        };

        Self {
            app: request.artifacts.app.to_string(),
            test_suite: request.artifacts.test_suite.to_string(),
            devices: request.devices.iter().map(|d| d.to_string()).collect(),
            shards,
            class,
            project: request.options.project.clone(),
            build_tag,
            device_logs: request.options.device_logs,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BuildResponse {
    pub message: Option<String>,
    pub build_id: Option<String>,
}

/// Body of a rejected request; BrowserStack uses either key
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ErrorResponse {
    pub(crate) fn describe(body: &str) -> String {
        serde_json::from_str::<ErrorResponse>(body)
            .ok()
            .and_then(|e| e.message.or(e.error))
            .unwrap_or_else(|| body.trim().to_string())
    }
}

/// `GET /app-automate/espresso/v2/builds/{id}`
#[derive(Debug, Deserialize)]
pub(crate) struct BuildStatusResponse {
    pub status: String,
    #[serde(default)]
    pub devices: Vec<BuildDevice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BuildDevice {
    pub device: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub sessions: Vec<BuildSession>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BuildSession {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Map a reported build or session status. Only `queued` and `running` keep
/// a run alive; anything unrecognised is terminal and never counts as passed.
fn run_status(status: Option<&str>) -> RunStatus {
    match status {
        Some("queued") => RunStatus::Queued,
        Some("running") => RunStatus::Running,
        Some("passed") => RunStatus::Passed,
        Some("failed") => RunStatus::Failed,
        Some("timedout") => RunStatus::Timedout,
        Some("stopped") => RunStatus::Stopped,
        _ => RunStatus::Error,
    }
}

impl From<BuildStatusResponse> for RunStatusReport {
    fn from(response: BuildStatusResponse) -> Self {
        let sessions = response
            .devices
            .into_iter()
            .flat_map(|device| {
                let target = DeviceTarget::from_parts(&device.device, &device.os_version);
                device.sessions.into_iter().map(move |session| DeviceSession {
                    device: target.clone(),
                    status: run_status(session.status.as_deref()),
                    session_id: SessionId::new(session.id),
                })
            })
            .collect();

        let status = run_status(Some(&response.status));
        if status == RunStatus::Error && response.status != "error" {
            log::warn!(
                "Unrecognised build status '{}'; treating the run as finished with an error",
                response.status
            );
        }

        Self { status, sessions }
    }
}

/// `GET /app-automate/espresso/v2/builds/{id}/sessions/{session_id}`
#[derive(Debug, Deserialize)]
pub(crate) struct SessionDetailsResponse {
    pub testcases: SessionTestcases,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionTestcases {
    #[serde(default)]
    pub data: Vec<ClassResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClassResult {
    pub class: String,
    #[serde(default)]
    pub testcases: Vec<CaseResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CaseResult {
    #[allow(dead_code)]
    pub name: Option<String>,
    pub status: String,
}

impl CaseResult {
    fn is_failure(&self) -> bool {
        matches!(self.status.as_str(), "failed" | "error" | "timedout")
    }
}

impl SessionDetailsResponse {
    /// Classes with at least one failing case, sorted and deduplicated
    pub(crate) fn failed_classes(&self) -> Vec<TestIdentifier> {
        self.testcases
            .data
            .iter()
            .filter(|class| class.testcases.iter().any(CaseResult::is_failure))
            .map(|class| TestIdentifier::new(class.class.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Deserialize a response body, mapping failures to a parse error for `endpoint`
pub(crate) fn parse<T: serde::de::DeserializeOwned>(
    endpoint: &str,
    body: &str,
) -> Result<T, ServiceError> {
    serde_json::from_str(body).map_err(|e| ServiceError::Parse {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtifactReference, ArtifactSet, RunOptions};

    fn request(selection: TestSelection, options: RunOptions) -> RunRequest {
        RunRequest {
            artifacts: ArtifactSet {
                app: ArtifactReference::from("bs://app"),
                test_suite: ArtifactReference::from("bs://suite"),
            },
            devices: vec![DeviceTarget::parse("Google Pixel 3-9.0").unwrap()],
            selection,
            options,
        }
    }

    #[test]
    fn test_sharded_build_request_shape() {
        let shards = vec![
            Shard {
                name: "Shard 1".to_string(),
                tests: vec!["com.a.T1".into()],
            },
            Shard {
                name: "Shard 2".to_string(),
                tests: vec!["com.a.T2".into()],
            },
        ];
        let body = BuildRequest::from(&request(TestSelection::Shards(shards), RunOptions::default()));
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["app"], "bs://app");
        assert_eq!(json["testSuite"], "bs://suite");
        assert_eq!(json["devices"][0], "Google Pixel 3-9.0");
        assert_eq!(json["shards"]["numberOfShards"], 2);
        assert_eq!(json["shards"]["mapping"][1]["name"], "Shard 2");
        assert_eq!(json["shards"]["mapping"][1]["strategy"], "class");
        assert_eq!(json["shards"]["mapping"][1]["values"][0], "com.a.T2");
        assert!(json.get("class").is_none());
        assert!(json.get("buildTag").is_none());
    }

    #[test]
    fn test_retry_request_uses_class_filter_and_rerun_tag() {
        let options = RunOptions {
            build_tag: Some("ci-42".to_string()),
            ..RunOptions::default()
        }
        .for_retry();
        let body = BuildRequest::from(&request(
            TestSelection::ClassFilter(vec!["com.a.T3".into()]),
            options,
        ));
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["class"][0], "com.a.T3");
        assert_eq!(json["buildTag"], "ci-42-rerun");
        assert!(json.get("shards").is_none());
    }

    #[test]
    fn test_status_response_flattens_sessions() {
        let body = r#"{
            "id": "b1",
            "status": "failed",
            "devices": [
                {"device": "Google Pixel 3", "os_version": "9.0",
                 "sessions": [{"id": "s1", "status": "failed"}, {"id": "s2", "status": "passed"}]}
            ]
        }"#;
        let report: RunStatusReport = parse::<BuildStatusResponse>("builds", body).unwrap().into();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.sessions.len(), 2);
        assert_eq!(report.sessions[0].device.as_str(), "Google Pixel 3-9.0");
        assert_eq!(report.sessions[1].session_id.as_str(), "s2");
        assert_eq!(report.sessions[0].status, RunStatus::Failed);
        assert_eq!(report.sessions[1].status, RunStatus::Passed);
    }

    #[test]
    fn test_status_without_status_field_is_parse_error() {
        let err = parse::<BuildStatusResponse>("builds", r#"{"devices": []}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Parse { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unknown_build_status_is_terminal() {
        let report: RunStatusReport =
            parse::<BuildStatusResponse>("builds", r#"{"status": "done", "devices": []}"#)
                .unwrap()
                .into();
        assert_eq!(report.status, RunStatus::Error);
        assert!(report.status.is_terminal());
    }

    #[test]
    fn test_non_string_build_status_is_parse_error() {
        let err = parse::<BuildStatusResponse>("builds", r#"{"status": 3}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Parse { .. }));
    }

    #[test]
    fn test_failed_classes_from_session_details() {
        let body = r#"{
            "id": "s1",
            "testcases": {
                "count": 4,
                "data": [
                    {"class": "com.a.T1", "testcases": [{"name": "a", "status": "passed"}]},
                    {"class": "com.a.T3", "testcases": [
                        {"name": "a", "status": "passed"},
                        {"name": "b", "status": "failed"}
                    ]},
                    {"class": "com.a.T4", "testcases": [{"name": "a", "status": "timedout"}]},
                    {"class": "com.a.T5", "testcases": [{"name": "a", "status": "skipped"}]}
                ]
            }
        }"#;
        let details: SessionDetailsResponse = parse("sessions", body).unwrap();
        assert_eq!(
            details.failed_classes(),
            vec![TestIdentifier::from("com.a.T3"), TestIdentifier::from("com.a.T4")]
        );
    }

    #[test]
    fn test_error_response_description() {
        assert_eq!(
            ErrorResponse::describe(r#"{"message": "Invalid app"}"#),
            "Invalid app"
        );
        assert_eq!(ErrorResponse::describe(r#"{"error": "Bad auth"}"#), "Bad auth");
        assert_eq!(ErrorResponse::describe("gateway down"), "gateway down");
    }
}
