use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::config::SchedulerConfig;
use super::events::{EventSink, ScanEvent};
use super::job::{JobError, JobStatus, RemoteCall, ScanJob, Transition, TransitionError};
use super::retry::{with_retry, RetryPolicy};
use crate::iq::{EvaluationClient, EvaluationStatus};

/// Repeated status inspection for admitted jobs.
pub struct PollLoop<C> {
    client: Arc<C>,
    interval: Duration,
    max_polls: u32,
    retry: RetryPolicy,
    fail_on_warning: bool,
}

impl<C> PollLoop<C>
where
    C: EvaluationClient,
{
    pub fn new(client: Arc<C>, config: &SchedulerConfig) -> Self {
        Self {
            client,
            interval: config.poll_interval,
            max_polls: config.max_polls.max(1),
            retry: config.retry.clone(),
            fail_on_warning: config.fail_on_warning,
        }
    }

    /// Checks the job's status once. Terminal jobs are returned untouched and
    /// the remote service is not contacted.
    pub async fn poll_once(
        &self,
        job: &mut ScanJob,
        sink: &dyn EventSink,
    ) -> Result<JobStatus, TransitionError> {
        let status = job.status();
        if status.is_terminal() {
            return Ok(status);
        }

        let handle = match job.handle() {
            Some(handle) if status == JobStatus::Polling => handle.clone(),
            _ => {
                return Err(TransitionError {
                    job: job.id(),
                    from: status,
                    to: JobStatus::Polling,
                })
            }
        };

        let attempted = {
            let current: &ScanJob = job;
            with_retry(
                &self.retry,
                || self.client.poll(&handle),
                |retry, delay, error| {
                    warn!(job = %current.id(), retry, ?delay, %error, "status check failed, retrying");
                    sink.publish(ScanEvent::retrying(
                        current,
                        RemoteCall::Poll,
                        retry,
                        delay,
                        error.to_string(),
                    ));
                },
            )
            .await
        };

        job.add_retries(RemoteCall::Poll, attempted.retries);
        let attempts = attempted.attempts();
        let transition = match attempted.result {
            Ok(EvaluationStatus::InProgress) if job.poll_count() + 1 >= self.max_polls => {
                job.abandon()
            }
            Ok(EvaluationStatus::InProgress) => job.record_in_progress(),
            Ok(EvaluationStatus::Completed(outcome)) => job.complete(outcome, self.fail_on_warning),
            Err(source) => job.mark_errored(JobError::Poll { attempts, source }),
        };

        publish_transition(job, sink, transition.clone());
        transition.map(|applied| applied.to)
    }

    /// Waits one interval, then checks status once.
    pub async fn poll_after_interval(
        &self,
        job: &mut ScanJob,
        sink: &dyn EventSink,
    ) -> Result<JobStatus, TransitionError> {
        if job.status().is_terminal() {
            return Ok(job.status());
        }
        tokio::time::sleep(self.interval).await;
        self.poll_once(job, sink).await
    }
}

/// Logs an applied edge and forwards it to the sink.
pub(crate) fn publish_transition(
    job: &ScanJob,
    sink: &dyn EventSink,
    transition: Result<Transition, TransitionError>,
) {
    let transition = match transition {
        Ok(transition) => transition,
        Err(err) => {
            error!(%err, "rejected job state transition");
            return;
        }
    };

    let metadata = job.metadata();
    match transition.to {
        JobStatus::Errored => error!(
            job = %job.id(),
            application = %metadata.application_name,
            stage = %metadata.stage,
            application_internal_id = %metadata.application_internal_id,
            status_code = ?job.last_error().and_then(JobError::status_code),
            error = %job.detail().unwrap_or_default(),
            "scan errored"
        ),
        JobStatus::Failed => warn!(
            job = %job.id(),
            application = %metadata.application_name,
            stage = %metadata.stage,
            outcome = %job.detail().unwrap_or_default(),
            "policy evaluation failed"
        ),
        JobStatus::Succeeded => info!(
            job = %job.id(),
            application = %metadata.application_name,
            stage = %metadata.stage,
            outcome = %job.detail().unwrap_or_default(),
            "scan succeeded"
        ),
        JobStatus::Polling if transition.from == JobStatus::Polling => debug!(
            job = %job.id(),
            polls = job.poll_count(),
            "scan still in progress"
        ),
        to => info!(
            job = %job.id(),
            application = %metadata.application_name,
            from = %transition.from,
            %to,
            "job advanced"
        ),
    }

    sink.publish(ScanEvent::transition(job, transition));
}
