use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::Instant;

use crate::inventory::ScanPlan;
use crate::iq::{
    EvaluationClient, EvaluationHandle, EvaluationStatus, PolicyAction, PolicyOutcome,
    RemoteError,
};
use crate::scheduler::{
    JobStatus, MemorySink, RetryPolicy, ScanEvent, ScanEventKind, Scheduler, SchedulerConfig,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Call {
    Submit(String),
    Poll(String),
}

type SubmitScript = VecDeque<Result<EvaluationHandle, RemoteError>>;
type PollScript = VecDeque<Result<EvaluationStatus, RemoteError>>;

/// Evaluation client answering from per-application scripts. Unscripted
/// submissions are accepted and unscripted polls complete with no violations.
#[derive(Default)]
pub(super) struct ScriptedClient {
    submits: Mutex<HashMap<String, SubmitScript>>,
    polls: Mutex<HashMap<String, PollScript>>,
    calls: Mutex<Vec<(Call, Instant)>>,
}

impl ScriptedClient {
    pub(super) fn with_submits(
        self,
        app_id: &str,
        results: Vec<Result<EvaluationHandle, RemoteError>>,
    ) -> Self {
        self.submits
            .lock()
            .expect("submit script mutex")
            .insert(app_id.to_string(), results.into());
        self
    }

    pub(super) fn with_polls(
        self,
        app_id: &str,
        results: Vec<Result<EvaluationStatus, RemoteError>>,
    ) -> Self {
        self.polls
            .lock()
            .expect("poll script mutex")
            .insert(app_id.to_string(), results.into());
        self
    }

    pub(super) fn calls(&self) -> Vec<Call> {
        self.timed_calls().into_iter().map(|(call, _)| call).collect()
    }

    pub(super) fn timed_calls(&self) -> Vec<(Call, Instant)> {
        self.calls.lock().expect("call log mutex").clone()
    }

    pub(super) fn submit_count(&self, app_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == Call::Submit(app_id.to_string()))
            .count()
    }

    pub(super) fn poll_count(&self, app_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == Call::Poll(app_id.to_string()))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .expect("call log mutex")
            .push((call, Instant::now()));
    }
}

#[async_trait]
impl EvaluationClient for ScriptedClient {
    async fn submit(
        &self,
        application_internal_id: &str,
        _stage: &str,
        _document: &[u8],
    ) -> Result<EvaluationHandle, RemoteError> {
        self.record(Call::Submit(application_internal_id.to_string()));
        self.submits
            .lock()
            .expect("submit script mutex")
            .get_mut(application_internal_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(handle_for(application_internal_id)))
    }

    async fn poll(&self, handle: &EvaluationHandle) -> Result<EvaluationStatus, RemoteError> {
        let app_id = app_for(handle);
        self.record(Call::Poll(app_id.clone()));
        self.polls
            .lock()
            .expect("poll script mutex")
            .get_mut(&app_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| completed(PolicyAction::None))
    }
}

pub(super) fn handle_for(app_id: &str) -> EvaluationHandle {
    EvaluationHandle(format!("api/v2/scan/applications/{app_id}/status/1"))
}

fn app_for(handle: &EvaluationHandle) -> String {
    handle
        .as_str()
        .trim_start_matches("api/v2/scan/applications/")
        .trim_end_matches("/status/1")
        .to_string()
}

pub(super) fn completed(action: PolicyAction) -> Result<EvaluationStatus, RemoteError> {
    Ok(EvaluationStatus::Completed(PolicyOutcome {
        action,
        report_html_url: Some("ui/links/application/report/1".to_string()),
        report_data_url: None,
    }))
}

pub(super) fn in_progress() -> Result<EvaluationStatus, RemoteError> {
    Ok(EvaluationStatus::InProgress)
}

pub(super) fn http(status: u16, body: &str) -> RemoteError {
    RemoteError::Status {
        status,
        body: body.to_string(),
    }
}

/// File name for the n-th fixture document; its internal id is `id{n}`.
pub(super) fn sbom_name(n: usize) -> String {
    format!("app-{n}_build_id{n}.xml")
}

pub(super) fn app_id(n: usize) -> String {
    format!("id{n}")
}

/// Writes the named documents into a fresh directory and plans them.
pub(super) fn plan_with(names: &[String]) -> (TempDir, ScanPlan) {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths: Vec<_> = names
        .iter()
        .map(|name| {
            let path = dir.path().join(name);
            std::fs::write(&path, "<bom/>").expect("write sbom");
            path
        })
        .collect();
    (dir, ScanPlan::from_paths(paths))
}

pub(super) fn plan_of(count: usize) -> (TempDir, ScanPlan) {
    let names: Vec<_> = (1..=count).map(sbom_name).collect();
    plan_with(&names)
}

pub(super) fn config(max_concurrency: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrency,
        poll_interval: Duration::from_secs(10),
        max_polls: 360,
        retry: RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2,
        },
        fail_on_warning: false,
    }
}

pub(super) fn scheduler(
    client: ScriptedClient,
    config: SchedulerConfig,
) -> (
    Scheduler<ScriptedClient, MemorySink>,
    Arc<ScriptedClient>,
    Arc<MemorySink>,
) {
    let client = Arc::new(client);
    let sink = Arc::new(MemorySink::default());
    let scheduler = Scheduler::new(client.clone(), sink.clone(), config);
    (scheduler, client, sink)
}

/// Position of the first event matching `predicate`.
pub(super) fn position(
    events: &[ScanEvent],
    predicate: impl Fn(&ScanEvent) -> bool,
) -> usize {
    events
        .iter()
        .position(predicate)
        .expect("matching event published")
}

pub(super) fn is_admission_of(event: &ScanEvent, job: u32) -> bool {
    event.job_id.map(|id| id.0) == Some(job)
        && matches!(event.kind, ScanEventKind::Admitted { .. })
}

pub(super) fn is_terminal_of(event: &ScanEvent, job: u32) -> bool {
    event.job_id.map(|id| id.0) == Some(job) && event.terminal_status().is_some()
}

pub(super) fn leaves_pending(event: &ScanEvent) -> bool {
    matches!(
        event.kind,
        ScanEventKind::Transition {
            from: JobStatus::Pending,
            ..
        }
    )
}
