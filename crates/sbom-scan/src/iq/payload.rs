use serde::Deserialize;

use super::{EvaluationStatus, PolicyAction, PolicyOutcome, RemoteError};

/// Body of a `202 Accepted` scan submission.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitResponse {
    #[serde(default)]
    pub(crate) status_url: Option<String>,
}

/// Body returned by the scan status endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusResponse {
    #[serde(default)]
    policy_action: Option<String>,
    #[serde(default)]
    report_html_url: Option<String>,
    #[serde(default)]
    report_data_url: Option<String>,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    error_message: Option<String>,
}

impl StatusResponse {
    pub(crate) fn into_status(self) -> Result<EvaluationStatus, RemoteError> {
        if self.is_error {
            let message = self
                .error_message
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(RemoteError::Evaluation(message));
        }

        if self.report_html_url.is_none() {
            return Ok(EvaluationStatus::InProgress);
        }

        let raw_action = self.policy_action.unwrap_or_default();
        let action = PolicyAction::from_label(&raw_action).ok_or_else(|| {
            RemoteError::InvalidResponse(format!("unknown policy action '{raw_action}'"))
        })?;

        Ok(EvaluationStatus::Completed(PolicyOutcome {
            action,
            report_html_url: self.report_html_url,
            report_data_url: self.report_data_url,
        }))
    }
}
