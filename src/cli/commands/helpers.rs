//! Shared helper functions for command execution.

use crate::cli::args::{CredentialArgs, TestListArgs};
use crate::error::{ConfigError, Result};
use crate::model::{DeviceTarget, TestIdentifier};
use crate::service::BrowserStackConfig;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Accepted shapes of a tests file
#[derive(Deserialize)]
#[serde(untagged)]
enum TestListFile {
    /// Plain array of class names
    Classes(Vec<String>),
    /// Test selection summary carrying the class list
    Summary {
        browserstack_test_classes: Vec<String>,
    },
}

impl TestListFile {
    fn into_classes(self) -> Vec<String> {
        match self {
            TestListFile::Classes(classes) => classes,
            TestListFile::Summary {
                browserstack_test_classes,
            } => browserstack_test_classes,
        }
    }
}

/// Parse the contents of a tests file
pub(super) fn parse_test_list(content: &str, path: Option<&Path>) -> Result<Vec<TestIdentifier>> {
    let file: TestListFile =
        serde_json::from_str(content).map_err(|e| ConfigError::InvalidTestList {
            path: path.map(Path::to_path_buf),
            reason: format!("expected a JSON array of class names: {}", e),
        })?;

    Ok(file
        .into_classes()
        .iter()
        .map(|class| class.trim())
        .filter(|class| !class.is_empty())
        .map(TestIdentifier::from)
        .collect())
}

/// Collect tests from `--tests-file` and `--test`, deduplicated in first-seen order
pub(super) async fn load_tests(args: &TestListArgs) -> Result<Vec<TestIdentifier>> {
    let mut tests = Vec::new();

    if let Some(path) = &args.tests_file {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ConfigError::InvalidTestList {
                    path: Some(path.clone()),
                    reason: format!("failed to read: {}", e),
                })?;
        tests.extend(parse_test_list(&content, Some(path))?);
    }

    tests.extend(
        args.tests
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(TestIdentifier::from),
    );

    let mut seen = BTreeSet::new();
    tests.retain(|t| seen.insert(t.clone()));

    if tests.is_empty() {
        return Err(ConfigError::NoTests.into());
    }
    Ok(tests)
}

/// Parse `--device` values, dropping duplicates
pub(super) fn parse_devices(raw: &[String]) -> Result<Vec<DeviceTarget>> {
    let mut devices = Vec::new();
    for value in raw {
        let device = DeviceTarget::parse(value)?;
        if devices.contains(&device) {
            log::warn!("Device '{}' listed more than once; running it once", device);
            continue;
        }
        devices.push(device);
    }
    if devices.is_empty() {
        return Err(ConfigError::NoDevices.into());
    }
    Ok(devices)
}

/// Build the client configuration from credential flags
pub(super) fn browserstack_config(args: &CredentialArgs) -> Result<BrowserStackConfig> {
    let username = args.username.clone().unwrap_or_default();
    if username.trim().is_empty() {
        return Err(ConfigError::MissingCredentials {
            variable: "BROWSERSTACK_USERNAME".to_string(),
        }
        .into());
    }
    let access_key = args.access_key.clone().unwrap_or_default();
    if access_key.trim().is_empty() {
        return Err(ConfigError::MissingCredentials {
            variable: "BROWSERSTACK_ACCESS_KEY".to_string(),
        }
        .into());
    }
    Ok(BrowserStackConfig::new(username, access_key).with_api_url(args.api_url.clone()))
}

/// File name sent with an upload
pub(super) fn artifact_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
