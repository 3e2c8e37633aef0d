use sbom_scan::scheduler::{JobStatus, RunSummary, ScanEvent, ScanEventKind};
use tokio::sync::mpsc::UnboundedReceiver;

/// Prints scheduler events until every sender is dropped.
pub(crate) async fn consume(mut events: UnboundedReceiver<ScanEvent>, total: usize) {
    let mut processed = 0usize;
    while let Some(event) = events.recv().await {
        if let Some(line) = describe(&event) {
            println!("{line}");
        }
        if event.terminal_status().is_some() {
            processed += 1;
            println!("PROCESSED {processed}/{total}");
        }
    }
}

pub(crate) fn describe(event: &ScanEvent) -> Option<String> {
    let name = &event.file_name;
    match &event.kind {
        ScanEventKind::Skipped { reason } => Some(format!("SKIPPED {name}: {reason}")),
        ScanEventKind::Admitted {
            occupancy,
            capacity,
        } => Some(format!("STARTED {name} (slots {occupancy}/{capacity})")),
        ScanEventKind::Transition { from, to, detail } => {
            let label = match to {
                JobStatus::Pending => return None,
                JobStatus::Submitted => "SUBMITTED",
                // repeated every interval while the evaluation runs
                JobStatus::Polling if *from == JobStatus::Polling => return None,
                JobStatus::Polling => "POLLING",
                JobStatus::Succeeded => "SUCCEEDED",
                JobStatus::Failed => "FAILED",
                JobStatus::Errored => "ERROR",
            };
            Some(match detail {
                Some(detail) => format!("{label} {name}: {detail}"),
                None => format!("{label} {name}"),
            })
        }
        ScanEventKind::Retrying {
            call,
            retry,
            delay_ms,
            error,
        } => Some(format!(
            "RETRY {name}: {call} retry {retry} in {delay_ms}ms after {error}"
        )),
    }
}

pub(crate) fn print_summary(summary: &RunSummary) {
    println!();
    println!("Results:");
    for job in &summary.jobs {
        println!("  {} {}", job.metadata().label(), job.status());
        if let Some(detail) = job.detail() {
            println!("    {detail}");
        }
        if let Some(error) = job.last_error() {
            if let Some(code) = error.status_code() {
                println!("    status code: {code}");
            }
            if let Some(body) = error.body().filter(|body| !body.is_empty()) {
                println!("    response: {body}");
            }
        }
    }

    for rejected in &summary.rejected {
        println!("  skipped {}", rejected.file_name);
    }

    println!();
    println!(
        "{} succeeded, {} failed, {} errored, {} skipped",
        summary.count(JobStatus::Succeeded),
        summary.count(JobStatus::Failed),
        summary.count(JobStatus::Errored),
        summary.rejected.len()
    );
}
