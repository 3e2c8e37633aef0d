//! Sonatype IQ Server evaluation contract and its HTTP implementation.

mod client;
mod payload;

pub use client::IqServerClient;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

/// Server-assigned locator used to poll a submitted evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EvaluationHandle(pub String);

impl EvaluationHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EvaluationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Policy verdict attached to a completed evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PolicyAction {
    None,
    Warning,
    Failure,
}

impl PolicyAction {
    /// Parses the `policyAction` value reported by IQ Server.
    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Some(Self::None),
            "warn" | "warning" => Some(Self::Warning),
            "fail" | "failure" => Some(Self::Failure),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PolicyAction::None => "None",
            PolicyAction::Warning => "Warning",
            PolicyAction::Failure => "Failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyOutcome {
    pub action: PolicyAction,
    pub report_html_url: Option<String>,
    pub report_data_url: Option<String>,
}

impl PolicyOutcome {
    pub fn summary(&self) -> String {
        match &self.report_html_url {
            Some(url) => format!("policy action {} (report: {url})", self.action.label()),
            None => format!("policy action {}", self.action.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationStatus {
    InProgress,
    Completed(PolicyOutcome),
}

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request could not be built: {0}")]
    Request(String),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("evaluation reported an error: {0}")]
    Evaluation(String),
}

impl RemoteError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            RemoteError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Transport seam between the scheduler and the evaluation service.
#[async_trait]
pub trait EvaluationClient: Send + Sync {
    async fn submit(
        &self,
        application_internal_id: &str,
        stage: &str,
        document: &[u8],
    ) -> Result<EvaluationHandle, RemoteError>;

    async fn poll(&self, handle: &EvaluationHandle) -> Result<EvaluationStatus, RemoteError>;

    /// Verifies reachability and credentials before any submission.
    async fn check_connection(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}
