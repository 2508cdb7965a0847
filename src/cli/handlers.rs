use super::commands::CliArgs;
use crate::config::ScanConfig;
use crate::scan::{ScanRequest, Scanner};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Runs a scan for parsed arguments and returns the process exit code
pub async fn handle_scan(args: CliArgs) -> i32 {
    match run_scan(args).await {
        Ok(sarif_path) => {
            info!("Wrote sarif to {}", sarif_path.display());
            0
        }
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

async fn run_scan(args: CliArgs) -> Result<PathBuf> {
    let config = ScanConfig::from_env().context("Invalid configuration")?;
    debug!(?config, "Loaded configuration");

    let request = ScanRequest::new(
        args.source_root,
        args.build_command,
        args.db_name,
        args.language,
        args.queries,
        args.sarif_output,
        config.threads,
    );

    let scanner = Scanner::new(config)?;
    let outcome = scanner.run(&request).await.context("CodeQL scan failed")?;

    Ok(outcome.sarif_path)
}
