use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::inventory::SbomMetadata;
use crate::iq::{EvaluationHandle, PolicyAction, PolicyOutcome, RemoteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{:04}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Submitted,
    Polling,
    Succeeded,
    Failed,
    Errored,
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Submitted => "Submitted",
            JobStatus::Polling => "Polling",
            JobStatus::Succeeded => "Succeeded",
            JobStatus::Failed => "Failed",
            JobStatus::Errored => "Errored",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Errored
        )
    }

    /// Statuses that hold an admission slot.
    pub fn is_in_flight(self) -> bool {
        matches!(self, JobStatus::Submitted | JobStatus::Polling)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Errored)
                | (Submitted, Polling)
                | (Submitted, Errored)
                | (Polling, Polling)
                | (Polling, Succeeded)
                | (Polling, Failed)
                | (Polling, Errored)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCall {
    Submit,
    Poll,
}

impl fmt::Display for RemoteCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCall::Submit => f.write_str("submission"),
            RemoteCall::Poll => f.write_str("poll"),
        }
    }
}

/// Reason a job ended in `Errored`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("could not read document {}: {reason}", .path.display())]
    Document { path: PathBuf, reason: String },
    #[error("submission failed after {attempts} attempt(s): {source}")]
    Submission { attempts: u32, source: RemoteError },
    #[error("poll failed after {attempts} attempt(s): {source}")]
    Poll { attempts: u32, source: RemoteError },
    #[error("evaluation still in progress after {polls} status check(s)")]
    Unfinished { polls: u32 },
}

impl JobError {
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            JobError::Submission { source, .. } | JobError::Poll { source, .. } => Some(source),
            JobError::Document { .. } | JobError::Unfinished { .. } => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.remote().and_then(RemoteError::status_code)
    }

    pub fn body(&self) -> Option<&str> {
        self.remote().and_then(RemoteError::body)
    }
}

/// A single applied edge of the job state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{job} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub job: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, PartialEq)]
enum JobState {
    Pending,
    Submitted {
        handle: EvaluationHandle,
    },
    Polling {
        handle: EvaluationHandle,
    },
    Succeeded {
        handle: EvaluationHandle,
        outcome: PolicyOutcome,
    },
    Failed {
        handle: EvaluationHandle,
        outcome: PolicyOutcome,
    },
    Errored {
        error: JobError,
    },
}

/// One document's journey through evaluation.
#[derive(Debug, Clone)]
pub struct ScanJob {
    id: JobId,
    file_path: PathBuf,
    metadata: SbomMetadata,
    state: JobState,
    submit_retries: u32,
    poll_retries: u32,
    polls: u32,
}

impl ScanJob {
    pub fn new(id: JobId, file_path: PathBuf, metadata: SbomMetadata) -> Self {
        Self {
            id,
            file_path,
            metadata,
            state: JobState::Pending,
            submit_retries: 0,
            poll_retries: 0,
            polls: 0,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_path.display().to_string())
    }

    pub fn metadata(&self) -> &SbomMetadata {
        &self.metadata
    }

    pub fn status(&self) -> JobStatus {
        match self.state {
            JobState::Pending => JobStatus::Pending,
            JobState::Submitted { .. } => JobStatus::Submitted,
            JobState::Polling { .. } => JobStatus::Polling,
            JobState::Succeeded { .. } => JobStatus::Succeeded,
            JobState::Failed { .. } => JobStatus::Failed,
            JobState::Errored { .. } => JobStatus::Errored,
        }
    }

    pub fn handle(&self) -> Option<&EvaluationHandle> {
        match &self.state {
            JobState::Submitted { handle }
            | JobState::Polling { handle }
            | JobState::Succeeded { handle, .. }
            | JobState::Failed { handle, .. } => Some(handle),
            JobState::Pending | JobState::Errored { .. } => None,
        }
    }

    pub fn outcome(&self) -> Option<&PolicyOutcome> {
        match &self.state {
            JobState::Succeeded { outcome, .. } | JobState::Failed { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&JobError> {
        match &self.state {
            JobState::Errored { error } => Some(error),
            _ => None,
        }
    }

    pub fn retries(&self, call: RemoteCall) -> u32 {
        match call {
            RemoteCall::Submit => self.submit_retries,
            RemoteCall::Poll => self.poll_retries,
        }
    }

    /// Number of status checks that reached the remote service and answered.
    pub fn poll_count(&self) -> u32 {
        self.polls
    }

    pub(crate) fn add_retries(&mut self, call: RemoteCall, retries: u32) {
        match call {
            RemoteCall::Submit => self.submit_retries += retries,
            RemoteCall::Poll => self.poll_retries += retries,
        }
    }

    /// One-line description of the terminal result.
    pub fn detail(&self) -> Option<String> {
        match &self.state {
            JobState::Succeeded { outcome, .. } | JobState::Failed { outcome, .. } => {
                Some(outcome.summary())
            }
            JobState::Errored { error } => Some(error.to_string()),
            _ => None,
        }
    }

    pub fn mark_submitted(
        &mut self,
        handle: EvaluationHandle,
    ) -> Result<Transition, TransitionError> {
        let transition = self.check(JobStatus::Submitted)?;
        self.state = JobState::Submitted { handle };
        Ok(transition)
    }

    pub fn begin_polling(&mut self) -> Result<Transition, TransitionError> {
        let transition = self.check(JobStatus::Polling)?;
        let handle = match &self.state {
            JobState::Submitted { handle } => handle.clone(),
            _ => return Err(self.rejected(JobStatus::Polling)),
        };
        self.state = JobState::Polling { handle };
        Ok(transition)
    }

    /// Records an `InProgress` answer; the job stays in `Polling`.
    pub fn record_in_progress(&mut self) -> Result<Transition, TransitionError> {
        if self.status() != JobStatus::Polling {
            return Err(self.rejected(JobStatus::Polling));
        }
        self.polls += 1;
        Ok(Transition {
            from: JobStatus::Polling,
            to: JobStatus::Polling,
        })
    }

    /// Records one more `InProgress` answer and gives up on the evaluation.
    pub fn abandon(&mut self) -> Result<Transition, TransitionError> {
        if self.status() != JobStatus::Polling {
            return Err(self.rejected(JobStatus::Errored));
        }
        let transition = self.check(JobStatus::Errored)?;
        self.polls += 1;
        self.state = JobState::Errored {
            error: JobError::Unfinished { polls: self.polls },
        };
        Ok(transition)
    }

    /// Finishes the evaluation, classifying the policy verdict.
    pub fn complete(
        &mut self,
        outcome: PolicyOutcome,
        fail_on_warning: bool,
    ) -> Result<Transition, TransitionError> {
        let target = verdict_status(outcome.action, fail_on_warning);
        let transition = self.check(target)?;
        let handle = match &self.state {
            JobState::Polling { handle } => handle.clone(),
            _ => return Err(self.rejected(target)),
        };

        self.polls += 1;
        self.state = match target {
            JobStatus::Failed => JobState::Failed { handle, outcome },
            _ => JobState::Succeeded { handle, outcome },
        };
        Ok(transition)
    }

    pub fn mark_errored(&mut self, error: JobError) -> Result<Transition, TransitionError> {
        let transition = self.check(JobStatus::Errored)?;
        self.state = JobState::Errored { error };
        Ok(transition)
    }

    fn check(&self, to: JobStatus) -> Result<Transition, TransitionError> {
        let from = self.status();
        if from.can_transition_to(to) {
            Ok(Transition { from, to })
        } else {
            Err(self.rejected(to))
        }
    }

    fn rejected(&self, to: JobStatus) -> TransitionError {
        TransitionError {
            job: self.id,
            from: self.status(),
            to,
        }
    }
}

fn verdict_status(action: PolicyAction, fail_on_warning: bool) -> JobStatus {
    match action {
        PolicyAction::Failure => JobStatus::Failed,
        PolicyAction::Warning if fail_on_warning => JobStatus::Failed,
        PolicyAction::Warning | PolicyAction::None => JobStatus::Succeeded,
    }
}
