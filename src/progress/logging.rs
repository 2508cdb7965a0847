//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { source_root } => {
                info!(source_root = %source_root.display(), "Starting CodeQL scan");
            }
            ProgressEvent::ToolLocated { executable, source } => {
                debug!(executable = %executable.display(), source = %source, "CodeQL resolved");
            }
            ProgressEvent::PackInstallComplete { pack, success } => {
                if *success {
                    info!(pack = %pack.display(), "Pack installed");
                } else {
                    warn!(pack = %pack.display(), "Pack install failed, continuing");
                }
            }
            ProgressEvent::PhaseStarted { phase } => {
                info!(phase = %phase, "Starting phase");
            }
            ProgressEvent::PhaseComplete { phase, duration } => {
                info!(
                    phase = %phase,
                    duration_ms = duration.as_millis(),
                    "Phase complete"
                );
            }
            ProgressEvent::Completed {
                sarif_path,
                total_time,
            } => {
                info!(
                    sarif = %sarif_path.display(),
                    total_time_ms = total_time.as_millis(),
                    "Scan complete"
                );
            }
            ProgressEvent::Failed { error } => {
                warn!(error = %error, "Scan failed");
            }
        }
    }
}
