use std::io::Write;
use std::path::Path;

use serde::Serialize;

use super::job::{JobStatus, RemoteCall, ScanJob};
use crate::inventory::MalformedNameError;

/// Terminal jobs of a run plus the files skipped for malformed names.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub jobs: Vec<ScanJob>,
    pub rejected: Vec<MalformedNameError>,
}

impl RunSummary {
    pub fn tracked(&self) -> usize {
        self.jobs.len()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs
            .iter()
            .filter(|job| job.status() == status)
            .count()
    }

    /// Skipped files do not count against the run.
    pub fn all_succeeded(&self) -> bool {
        self.jobs
            .iter()
            .all(|job| job.status() == JobStatus::Succeeded)
    }

    pub fn exit_code(&self) -> u8 {
        if self.all_succeeded() {
            0
        } else {
            1
        }
    }

    pub fn rows(&self) -> Vec<ReportRow> {
        self.jobs.iter().map(ReportRow::from_job).collect()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(writer);
        for row in self.rows() {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_csv_path<P: AsRef<Path>>(&self, path: P) -> Result<(), csv::Error> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}

/// One line of the CSV run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub file: String,
    pub application_name: String,
    pub stage: String,
    pub application_internal_id: String,
    pub status: &'static str,
    pub policy_action: Option<&'static str>,
    pub report_url: Option<String>,
    pub submit_retries: u32,
    pub poll_retries: u32,
    pub error: Option<String>,
}

impl ReportRow {
    fn from_job(job: &ScanJob) -> Self {
        let metadata = job.metadata();
        let outcome = job.outcome();

        Self {
            file: job.file_name(),
            application_name: metadata.application_name.clone(),
            stage: metadata.stage.clone(),
            application_internal_id: metadata.application_internal_id.clone(),
            status: job.status().label(),
            policy_action: outcome.map(|outcome| outcome.action.label()),
            report_url: outcome.and_then(|outcome| outcome.report_html_url.clone()),
            submit_retries: job.retries(RemoteCall::Submit),
            poll_retries: job.retries(RemoteCall::Poll),
            error: job.last_error().map(ToString::to_string),
        }
    }
}
