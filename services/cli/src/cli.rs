use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sbom_scan::config::ScanConfig;
use sbom_scan::error::AppError;
use sbom_scan::inventory::{discover_documents, ScanPlan};
use sbom_scan::iq::{EvaluationClient, IqServerClient};
use sbom_scan::scheduler::{Scheduler, TracingSink};
use sbom_scan::telemetry;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::render;

#[derive(Parser, Debug)]
#[command(
    name = "sbom-scan",
    about = "Submit CycloneDX SBOM files to Sonatype IQ Server for policy evaluation",
    version
)]
pub struct Cli {
    /// Directory containing `[application_name]_[stage]_[applicationInternalId].xml` files
    #[arg(short = 'd', long)]
    pub(crate) directory: PathBuf,
    /// IQ Server base URL, e.g. http://localhost:8070 (falls back to IQ_SERVER_URL)
    #[arg(short = 'i', long)]
    pub(crate) url: Option<String>,
    /// IQ Server username (falls back to IQ_USERNAME)
    #[arg(short = 'u', long)]
    pub(crate) user: Option<String>,
    /// IQ Server password (falls back to IQ_PASSWORD)
    #[arg(short = 'p', long)]
    pub(crate) password: Option<String>,
    /// Maximum number of evaluations in flight at once (default 5)
    #[arg(short = 'c', long)]
    pub(crate) max_concurrency: Option<usize>,
    /// Seconds between status checks of a running evaluation (default 10)
    #[arg(long)]
    pub(crate) poll_interval_secs: Option<u64>,
    /// Status checks before an unfinished evaluation is given up (default 360)
    #[arg(long)]
    pub(crate) max_polls: Option<u32>,
    /// Retries for transient server or network failures (default 3)
    #[arg(long)]
    pub(crate) max_retries: Option<u32>,
    /// Count policy warnings as failures
    #[arg(long)]
    pub(crate) fail_on_warning: bool,
    /// Send progress to the log instead of printing it
    #[arg(short = 'q', long)]
    pub(crate) quiet: bool,
    /// Write a per-file CSV report to this path
    #[arg(long)]
    pub(crate) report: Option<PathBuf>,
}

impl Cli {
    /// Command-line values take precedence over the environment.
    pub(crate) fn apply(&mut self, config: &mut ScanConfig) {
        if let Some(url) = self.url.take() {
            config.server.url = url;
        }
        if let Some(user) = self.user.take() {
            config.server.username = user;
        }
        if let Some(password) = self.password.take() {
            config.server.password = password;
        }
        if let Some(max_concurrency) = self.max_concurrency {
            config.scheduler.max_concurrency = max_concurrency;
        }
        if let Some(secs) = self.poll_interval_secs {
            config.scheduler.poll_interval = std::time::Duration::from_secs(secs);
        }
        if let Some(max_polls) = self.max_polls {
            config.scheduler.max_polls = max_polls;
        }
        if let Some(max_retries) = self.max_retries {
            config.scheduler.retry.max_retries = max_retries;
        }
        if self.fail_on_warning {
            config.scheduler.fail_on_warning = true;
        }
    }
}

pub(crate) async fn run() -> Result<u8, AppError> {
    let mut cli = Cli::parse();
    let mut config = ScanConfig::load()?;
    cli.apply(&mut config);

    telemetry::init(&config.telemetry)?;
    execute(cli, config).await
}

/// Scans `cli.directory` with an already merged configuration.
pub(crate) async fn execute(cli: Cli, config: ScanConfig) -> Result<u8, AppError> {
    config.validate()?;

    let documents = discover_documents(&cli.directory)?;
    if documents.is_empty() {
        info!(directory = %cli.directory.display(), "no SBOM documents found");
        println!("No .xml files found in '{}'.", cli.directory.display());
        return Ok(0);
    }

    let plan = ScanPlan::from_paths(documents);
    println!(
        "Found {} SBOM files to process ({} skipped).",
        plan.jobs.len(),
        plan.rejected.len()
    );

    let client = Arc::new(IqServerClient::from_config(&config.server)?);
    client.check_connection().await?;
    info!(url = client.base_url(), "IQ Server reachable");

    let summary = if cli.quiet {
        Scheduler::new(client, Arc::new(TracingSink), config.scheduler.clone())
            .run(plan)
            .await
    } else {
        let (events, receiver) = mpsc::unbounded_channel();
        let renderer = tokio::spawn(render::consume(receiver, plan.jobs.len()));

        let scheduler = Scheduler::new(client, Arc::new(events), config.scheduler.clone());
        let summary = scheduler.run(plan).await;
        // closes the channel so the renderer drains and exits
        drop(scheduler);

        if let Err(err) = renderer.await {
            warn!(%err, "progress renderer stopped early");
        }
        summary
    };

    render::print_summary(&summary);

    if let Some(path) = &cli.report {
        summary.write_csv_path(path)?;
        println!("Report written to {}", path.display());
    }

    Ok(summary.exit_code())
}
