use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use super::job::{JobId, JobStatus, RemoteCall, ScanJob, Transition};
use crate::inventory::MalformedNameError;

/// Progress notification published by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanEvent {
    pub at: DateTime<Utc>,
    pub job_id: Option<JobId>,
    pub file_name: String,
    pub kind: ScanEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEventKind {
    /// File left out of the run because its name is malformed.
    Skipped { reason: String },
    /// Job took an admission slot.
    Admitted { occupancy: usize, capacity: usize },
    Transition {
        from: JobStatus,
        to: JobStatus,
        detail: Option<String>,
    },
    Retrying {
        call: RemoteCall,
        retry: u32,
        delay_ms: u64,
        error: String,
    },
}

impl ScanEvent {
    fn for_job(job: &ScanJob, kind: ScanEventKind) -> Self {
        Self {
            at: Utc::now(),
            job_id: Some(job.id()),
            file_name: job.file_name(),
            kind,
        }
    }

    pub fn skipped(error: &MalformedNameError) -> Self {
        Self {
            at: Utc::now(),
            job_id: None,
            file_name: error.file_name.clone(),
            kind: ScanEventKind::Skipped {
                reason: error.to_string(),
            },
        }
    }

    pub fn admitted(job: &ScanJob, occupancy: usize, capacity: usize) -> Self {
        Self::for_job(
            job,
            ScanEventKind::Admitted {
                occupancy,
                capacity,
            },
        )
    }

    /// Describes an edge just applied to `job`.
    pub fn transition(job: &ScanJob, transition: Transition) -> Self {
        let detail = if transition.to.is_terminal() {
            job.detail()
        } else if transition.to == JobStatus::Submitted {
            job.handle().map(|handle| format!("status url {handle}"))
        } else {
            None
        };

        Self::for_job(
            job,
            ScanEventKind::Transition {
                from: transition.from,
                to: transition.to,
                detail,
            },
        )
    }

    pub fn retrying(
        job: &ScanJob,
        call: RemoteCall,
        retry: u32,
        delay: Duration,
        error: String,
    ) -> Self {
        Self::for_job(
            job,
            ScanEventKind::Retrying {
                call,
                retry,
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error,
            },
        )
    }

    /// Status reached by this event when it finishes a job.
    pub fn terminal_status(&self) -> Option<JobStatus> {
        match &self.kind {
            ScanEventKind::Transition { to, .. } if to.is_terminal() => Some(*to),
            _ => None,
        }
    }
}

/// Consumer of scheduler progress; implementations must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ScanEvent);
}

impl EventSink for UnboundedSender<ScanEvent> {
    fn publish(&self, event: ScanEvent) {
        // A closed receiver only means nobody is rendering progress.
        let _ = self.send(event);
    }
}

/// Writes every event to the `tracing` subscriber at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: ScanEvent) {
        let job = event.job_id.map(|id| id.to_string()).unwrap_or_default();
        match &event.kind {
            ScanEventKind::Skipped { reason } => {
                warn!(file = %event.file_name, %reason, "file skipped")
            }
            ScanEventKind::Admitted {
                occupancy,
                capacity,
            } => info!(%job, file = %event.file_name, occupancy, capacity, "job admitted"),
            ScanEventKind::Transition { from, to, detail } => info!(
                %job,
                file = %event.file_name,
                from = from.label(),
                to = to.label(),
                detail = detail.as_deref().unwrap_or(""),
                "job transition"
            ),
            ScanEventKind::Retrying {
                call,
                retry,
                delay_ms,
                error,
            } => warn!(%job, file = %event.file_name, %call, retry, delay_ms, %error, "retrying"),
        }
    }
}

/// Buffers events in memory, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ScanEvent>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Transitions recorded for one job, in publication order.
    pub fn transitions(&self, job: JobId) -> Vec<(JobStatus, JobStatus)> {
        self.events()
            .into_iter()
            .filter(|event| event.job_id == Some(job))
            .filter_map(|event| match event.kind {
                ScanEventKind::Transition { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: ScanEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
