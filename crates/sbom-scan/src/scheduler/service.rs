use std::collections::VecDeque;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::config::SchedulerConfig;
use super::events::{EventSink, ScanEvent};
use super::gate::{AdmissionGate, SlotPermit};
use super::job::{JobError, JobStatus, RemoteCall, ScanJob};
use super::poll::{publish_transition, PollLoop};
use super::retry::{with_retry, RetryPolicy};
use super::summary::RunSummary;
use crate::inventory::ScanPlan;
use crate::iq::EvaluationClient;

/// A job returning to the coordinator together with the slot it holds.
struct Step {
    job: ScanJob,
    slot: SlotPermit,
}

/// Drives every job from `Pending` to a terminal status while keeping at most
/// `max_concurrency` of them between submission and completion.
pub struct Scheduler<C, S> {
    client: Arc<C>,
    sink: Arc<S>,
    gate: AdmissionGate,
    poller: Arc<PollLoop<C>>,
    retry: RetryPolicy,
}

impl<C, S> Scheduler<C, S>
where
    C: EvaluationClient + 'static,
    S: EventSink + 'static,
{
    pub fn new(client: Arc<C>, sink: Arc<S>, config: SchedulerConfig) -> Self {
        let poller = Arc::new(PollLoop::new(client.clone(), &config));
        Self {
            gate: AdmissionGate::new(config.max_concurrency),
            retry: config.retry,
            client,
            sink,
            poller,
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Runs the plan to completion. Per-job failures never abort the run.
    pub async fn run(&self, plan: ScanPlan) -> RunSummary {
        let ScanPlan { jobs, rejected } = plan;
        for malformed in &rejected {
            self.sink.publish(ScanEvent::skipped(malformed));
        }

        info!(
            jobs = jobs.len(),
            skipped = rejected.len(),
            max_concurrency = self.gate.capacity(),
            "starting scan run"
        );

        let mut finished = Vec::with_capacity(jobs.len());
        let mut pending: VecDeque<ScanJob> = jobs.into();
        let mut in_flight: JoinSet<Step> = JoinSet::new();

        loop {
            while !pending.is_empty() {
                let Some(slot) = self.gate.try_acquire() else {
                    break;
                };
                if let Some(job) = pending.pop_front() {
                    self.spawn_submit(&mut in_flight, job, slot);
                }
            }

            if in_flight.is_empty() {
                let Some(job) = pending.pop_front() else {
                    break;
                };
                // Every slot is held outside this run; wait for one to free up.
                match self.gate.acquire().await {
                    Ok(slot) => self.spawn_submit(&mut in_flight, job, slot),
                    Err(err) => {
                        error!(%err, "admission gate closed, abandoning pending jobs");
                        finished.push(job);
                        finished.extend(pending.drain(..));
                        break;
                    }
                }
                continue;
            }

            let Some(joined) = in_flight.join_next().await else {
                continue;
            };

            match joined {
                Ok(Step { job, slot }) => match job.status() {
                    JobStatus::Polling => self.spawn_poll(&mut in_flight, job, slot),
                    status if status.is_terminal() => {
                        slot.release();
                        finished.push(job);
                    }
                    status => {
                        error!(job = %job.id(), %status, "job stalled outside the state machine");
                        slot.release();
                        finished.push(job);
                    }
                },
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => warn!(%err, "scan task cancelled"),
            }
        }

        finished.sort_by_key(|job| job.id());
        let summary = RunSummary {
            jobs: finished,
            rejected,
        };

        info!(
            succeeded = summary.count(JobStatus::Succeeded),
            failed = summary.count(JobStatus::Failed),
            errored = summary.count(JobStatus::Errored),
            skipped = summary.rejected.len(),
            "scan run finished"
        );
        summary
    }

    fn spawn_submit(&self, in_flight: &mut JoinSet<Step>, job: ScanJob, slot: SlotPermit) {
        info!(
            job = %job.id(),
            application = %job.metadata().application_name,
            occupancy = self.gate.occupancy(),
            capacity = self.gate.capacity(),
            "admitted job"
        );
        self.sink.publish(ScanEvent::admitted(
            &job,
            self.gate.occupancy(),
            self.gate.capacity(),
        ));

        let client = self.client.clone();
        let sink = self.sink.clone();
        let retry = self.retry.clone();
        in_flight.spawn(async move {
            let job = submit(client.as_ref(), sink.as_ref(), &retry, job).await;
            Step { job, slot }
        });
    }

    fn spawn_poll(&self, in_flight: &mut JoinSet<Step>, mut job: ScanJob, slot: SlotPermit) {
        let poller = self.poller.clone();
        let sink = self.sink.clone();
        in_flight.spawn(async move {
            if let Err(err) = poller.poll_after_interval(&mut job, sink.as_ref()).await {
                error!(%err, "poll skipped");
            }
            Step { job, slot }
        });
    }
}

/// Reads the document and submits it, leaving the job in `Polling` or
/// `Errored`.
async fn submit<C: EvaluationClient>(
    client: &C,
    sink: &dyn EventSink,
    retry: &RetryPolicy,
    mut job: ScanJob,
) -> ScanJob {
    let document = match tokio::fs::read(job.file_path()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let error = JobError::Document {
                path: job.file_path().to_path_buf(),
                reason: err.to_string(),
            };
            let transition = job.mark_errored(error);
            publish_transition(&job, sink, transition);
            return job;
        }
    };

    let metadata = job.metadata().clone();
    let attempted = {
        let current = &job;
        with_retry(
            retry,
            || client.submit(&metadata.application_internal_id, &metadata.stage, &document),
            |retry, delay, error| {
                warn!(job = %current.id(), retry, ?delay, %error, "submission failed, retrying");
                sink.publish(ScanEvent::retrying(
                    current,
                    RemoteCall::Submit,
                    retry,
                    delay,
                    error.to_string(),
                ));
            },
        )
        .await
    };

    job.add_retries(RemoteCall::Submit, attempted.retries);
    let attempts = attempted.attempts();
    match attempted.result {
        Ok(handle) => {
            let transition = job.mark_submitted(handle);
            publish_transition(&job, sink, transition);
            let transition = job.begin_polling();
            publish_transition(&job, sink, transition);
        }
        Err(source) => {
            let transition = job.mark_errored(JobError::Submission { attempts, source });
            publish_transition(&job, sink, transition);
        }
    }

    job
}
