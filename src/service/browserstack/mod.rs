//! BrowserStack App Automate client for Espresso runs.

mod wire;

pub use wire::RERUN_TAG_SUFFIX;

use crate::error::{ConfigError, Result, ServiceError};
use crate::model::{
    ArtifactKind, ArtifactReference, RunHandle, RunRequest, SessionId, TestIdentifier,
};
use crate::service::{ExecutionService, RunStatusReport};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;
use wire::{
    AppUploadResponse, BuildRequest, BuildResponse, BuildStatusResponse, ErrorResponse,
    SessionDetailsResponse, TestSuiteUploadResponse,
};

/// Production API endpoint
pub const DEFAULT_API_URL: &str = "https://api-cloud.browserstack.com";

/// Connection settings for the BrowserStack API
#[derive(Debug, Clone)]
pub struct BrowserStackConfig {
    /// API base URL
    pub api_url: String,
    /// Account user name
    pub username: String,
    /// Account access key
    pub access_key: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl BrowserStackConfig {
    /// Config for the production API
    pub fn new(username: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            username: username.into(),
            access_key: access_key.into(),
            request_timeout: Duration::from_secs(300),
        }
    }

    /// Override the API base URL
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

/// HTTP client implementing [`ExecutionService`] against App Automate
#[derive(Debug)]
pub struct BrowserStackClient {
    http: reqwest::Client,
    base_url: Url,
    config: BrowserStackConfig,
    /// Upload cache keyed by artifact kind and content digest
    uploads: Mutex<HashMap<(ArtifactKind, String), ArtifactReference>>,
}

impl BrowserStackClient {
    /// Create a client. Fails when credentials are blank or the URL is invalid.
    pub fn new(config: BrowserStackConfig) -> Result<Self> {
        if config.username.trim().is_empty() {
            return Err(ConfigError::MissingCredentials {
                variable: "BROWSERSTACK_USERNAME".to_string(),
            }
            .into());
        }
        if config.access_key.trim().is_empty() {
            return Err(ConfigError::MissingCredentials {
                variable: "BROWSERSTACK_ACCESS_KEY".to_string(),
            }
            .into());
        }

        let base_url = Url::parse(&config.api_url).map_err(|e| ConfigError::InvalidApiUrl {
            url: config.api_url.clone(),
            reason: e.to_string(),
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Transport {
                endpoint: config.api_url.clone(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url,
            config,
            uploads: Mutex::new(HashMap::new()),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| {
            ServiceError::Transport {
                endpoint: path.to_string(),
                reason: format!("invalid endpoint URL: {}", e),
            }
            .into()
        })
    }

    /// Send a request with basic auth and return status plus body text
    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<(StatusCode, String), ServiceError> {
        let response = request
            .basic_auth(&self.config.username, Some(&self.config.access_key))
            .send()
            .await
            .map_err(|e| ServiceError::Transport {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ServiceError::Transport {
            endpoint: endpoint.to_string(),
            reason: format!("failed to read response body: {}", e),
        })?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ServiceError::Unauthorized {
                endpoint: endpoint.to_string(),
            });
        }
        Ok((status, body))
    }

    /// GET a JSON document, mapping non-success statuses to `ServiceError::Http`
    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let (status, body) = self.send(path, self.http.get(url)).await?;
        if !status.is_success() {
            return Err(ServiceError::Http {
                endpoint: path.to_string(),
                status: status.as_u16(),
                message: ErrorResponse::describe(&body),
            }
            .into());
        }
        Ok(wire::parse(path, &body)?)
    }

    fn cached_upload(&self, key: &(ArtifactKind, String)) -> Option<ArtifactReference> {
        self.uploads
            .lock()
            .ok()
            .and_then(|cache| cache.get(key).cloned())
    }

    fn remember_upload(&self, key: (ArtifactKind, String), reference: ArtifactReference) {
        if let Ok(mut cache) = self.uploads.lock() {
            cache.insert(key, reference);
        }
    }
}

fn upload_path(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::App => "/app-automate/upload",
        ArtifactKind::TestSuite => "/app-automate/espresso/test-suite",
    }
}

#[async_trait]
impl ExecutionService for BrowserStackClient {
    async fn upload_artifact(
        &self,
        kind: ArtifactKind,
        file_name: &str,
        content: Bytes,
    ) -> Result<ArtifactReference> {
        let digest = hex::encode(Sha256::digest(&content));
        let key = (kind, digest);
        if let Some(reference) = self.cached_upload(&key) {
            log::debug!("reusing {} upload {} for {}", kind, reference, file_name);
            return Ok(reference);
        }

        let path = upload_path(kind);
        let url = self.endpoint(path)?;
        let upload_error = |reason: String, retryable: bool| ServiceError::Upload {
            artifact: file_name.to_string(),
            reason,
            retryable,
        };

        log::info!("Uploading {} '{}' ({} bytes)", kind, file_name, content.len());
        let part = reqwest::multipart::Part::bytes(content.to_vec()).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let (status, body) = match self.send(path, self.http.post(url).multipart(form)).await {
            Ok(response) => response,
            Err(ServiceError::Transport { reason, .. }) => return Err(upload_error(reason, true).into()),
            Err(other) => return Err(other.into()),
        };

        if !status.is_success() {
            let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
            return Err(upload_error(
                format!("HTTP {}: {}", status.as_u16(), ErrorResponse::describe(&body)),
                retryable,
            )
            .into());
        }

        let reference = match kind {
            ArtifactKind::App => wire::parse::<AppUploadResponse>(path, &body)
                .map(|r| r.app_url)
                .map_err(|e| upload_error(e.to_string(), false))?,
            ArtifactKind::TestSuite => wire::parse::<TestSuiteUploadResponse>(path, &body)
                .map(|r| r.test_suite_url)
                .map_err(|e| upload_error(e.to_string(), false))?,
        };
        let reference = ArtifactReference::new(reference);

        log::info!("{} url: {}", kind, reference);
        self.remember_upload(key, reference.clone());
        Ok(reference)
    }

    async fn submit_run(&self, request: &RunRequest) -> Result<RunHandle> {
        let path = "/app-automate/espresso/v2/build";
        let url = self.endpoint(path)?;
        let body = BuildRequest::from(request);

        let (status, text) = match self.send(path, self.http.post(url).json(&body)).await {
            Ok(response) => response,
            Err(ServiceError::Transport { reason, .. }) => {
                return Err(ServiceError::Submission { reason }.into());
            }
            Err(other) => return Err(other.into()),
        };

        if !status.is_success() {
            return Err(ServiceError::Submission {
                reason: format!("HTTP {}: {}", status.as_u16(), ErrorResponse::describe(&text)),
            }
            .into());
        }

        let response: BuildResponse =
            wire::parse(path, &text).map_err(|e| ServiceError::Submission {
                reason: e.to_string(),
            })?;

        if response.message.as_deref() != Some("Success") {
            return Err(ServiceError::Submission {
                reason: response
                    .message
                    .unwrap_or_else(|| "response carried no message".to_string()),
            }
            .into());
        }

        match response.build_id {
            Some(id) if !id.trim().is_empty() => {
                log::info!("build id: {}", id);
                Ok(RunHandle::new(id))
            }
            _ => Err(ServiceError::Submission {
                reason: "response carried no build_id".to_string(),
            }
            .into()),
        }
    }

    async fn get_run_status(&self, handle: &RunHandle) -> Result<RunStatusReport> {
        let path = format!("/app-automate/espresso/v2/builds/{}", handle);
        let response: BuildStatusResponse = self.get_json(&path).await?;
        Ok(response.into())
    }

    async fn get_failure_report(
        &self,
        handle: &RunHandle,
        session: &SessionId,
    ) -> Result<Vec<TestIdentifier>> {
        let path = format!(
            "/app-automate/espresso/v2/builds/{}/sessions/{}",
            handle, session
        );
        let details: SessionDetailsResponse = self.get_json(&path).await?;
        Ok(details.failed_classes())
    }
}
