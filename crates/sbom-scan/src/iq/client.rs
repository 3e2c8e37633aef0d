use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use tracing::debug;

use super::payload::{StatusResponse, SubmitResponse};
use super::{EvaluationClient, EvaluationHandle, EvaluationStatus, RemoteError};
use crate::config::ServerConfig;

/// HTTP client for the IQ Server third-party CycloneDX scan API.
pub struct IqServerClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    submit_timeout: Duration,
    poll_timeout: Duration,
}

impl IqServerClient {
    pub fn from_config(config: &ServerConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sbom-scan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| RemoteError::Request(err.to_string()))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            submit_timeout: config.submit_timeout,
            poll_timeout: config.poll_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn submit_url(&self, application_internal_id: &str) -> String {
        format!(
            "{}/api/v2/scan/applications/{}/sources/cyclonedx",
            self.base_url, application_internal_id
        )
    }

    /// Status locators come back relative to the server root.
    fn status_url(&self, handle: &EvaluationHandle) -> String {
        format!(
            "{}/{}",
            self.base_url,
            handle.as_str().trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for IqServerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IqServerClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EvaluationClient for IqServerClient {
    async fn submit(
        &self,
        application_internal_id: &str,
        stage: &str,
        document: &[u8],
    ) -> Result<EvaluationHandle, RemoteError> {
        let response = self
            .http
            .post(self.submit_url(application_internal_id))
            .query(&[("stageId", stage)])
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, "application/xml")
            .timeout(self.submit_timeout)
            .body(document.to_vec())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let body = read_success_body(response).await?;
        let parsed: SubmitResponse = serde_json::from_str(&body).map_err(|err| {
            RemoteError::InvalidResponse(format!("submission response is not JSON: {err}"))
        })?;

        let status_url = parsed.status_url.filter(|url| !url.is_empty()).ok_or_else(|| {
            RemoteError::InvalidResponse("submission response has no statusUrl".to_string())
        })?;

        debug!(application_internal_id, stage, %status_url, "scan accepted");
        Ok(EvaluationHandle(status_url))
    }

    async fn poll(&self, handle: &EvaluationHandle) -> Result<EvaluationStatus, RemoteError> {
        let response = self
            .http
            .get(self.status_url(handle))
            .basic_auth(&self.username, Some(&self.password))
            .timeout(self.poll_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        // IQ Server answers 404 until the scan report exists.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(EvaluationStatus::InProgress);
        }

        let body = read_success_body(response).await?;
        let parsed: StatusResponse = serde_json::from_str(&body).map_err(|err| {
            RemoteError::InvalidResponse(format!("status response is not JSON: {err}"))
        })?;

        parsed.into_status()
    }

    async fn check_connection(&self) -> Result<(), RemoteError> {
        let response = self
            .http
            .get(format!("{}/api/v2/applications", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .timeout(self.poll_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        read_success_body(response).await.map(|_| ())
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RemoteError {
    if err.is_builder() {
        RemoteError::Request(err.to_string())
    } else {
        RemoteError::Transport(err.to_string())
    }
}

async fn read_success_body(response: Response) -> Result<String, RemoteError> {
    let status = response.status();
    let body = response.text().await.map_err(map_reqwest_error)?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
