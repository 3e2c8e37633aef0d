use sbom_scan_cli::run;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("application error: {err}");
            ExitCode::from(2)
        }
    }
}
