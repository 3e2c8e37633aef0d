//! Bounded-concurrency scheduling of SBOM evaluations.
//!
//! Jobs wait in an unbounded pending queue until the [`AdmissionGate`] grants a
//! slot. The slot travels with the job through submission and every poll and is
//! returned when the job reaches `Succeeded`, `Failed` or `Errored`.

mod config;
mod events;
mod gate;
mod job;
mod poll;
mod retry;
mod service;
mod summary;

#[cfg(test)]
mod tests;

pub use config::SchedulerConfig;
pub use events::{EventSink, MemorySink, ScanEvent, ScanEventKind, TracingSink};
pub use gate::{AdmissionGate, SlotPermit};
pub use job::{JobError, JobId, JobStatus, RemoteCall, ScanJob, Transition, TransitionError};
pub use poll::PollLoop;
pub use retry::{classify, ErrorClass, RetryPolicy};
pub use service::Scheduler;
pub use summary::{ReportRow, RunSummary};
