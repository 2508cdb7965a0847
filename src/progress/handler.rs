//! Progress handler trait and events

use crate::types::{LocationSource, ToolPhase};
use std::path::PathBuf;
use std::time::Duration;

/// Events emitted while a scan runs
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Scan started
    Started { source_root: PathBuf },

    /// CodeQL executable resolved
    ToolLocated {
        executable: PathBuf,
        source: LocationSource,
    },

    /// A supplementary pack install finished
    PackInstallComplete { pack: PathBuf, success: bool },

    /// A tool phase started
    PhaseStarted { phase: ToolPhase },

    /// A tool phase finished successfully
    PhaseComplete { phase: ToolPhase, duration: Duration },

    /// Scan completed and results were written
    Completed {
        sarif_path: PathBuf,
        total_time: Duration,
    },

    /// Scan failed
    Failed { error: String },
}

/// Trait for handling progress events during a scan
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
