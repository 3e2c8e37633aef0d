mod cli;
mod render;

use sbom_scan::config::ScanConfig;
use sbom_scan::error::AppError;

pub use cli::Cli;

/// Runs the command line and returns the process exit code.
pub async fn run() -> Result<u8, AppError> {
    cli::run().await
}

/// Runs a scan for parsed arguments against `config`, which already carries
/// any command-line overrides. Telemetry is left to the caller.
pub async fn execute(cli: Cli, config: ScanConfig) -> Result<u8, AppError> {
    cli::execute(cli, config).await
}
