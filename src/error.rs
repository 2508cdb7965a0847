//! Error taxonomy for a scan run

use crate::config::ConfigError;
use crate::types::ToolPhase;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a scan. None of them are retried.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The bundle could not be downloaded
    #[error("Failed to download CodeQL bundle from {url}: {message}")]
    Fetch { url: String, message: String },

    /// The bundle archive is corrupt, incomplete or does not contain the tool
    #[error("Failed to extract {}: {message}", archive.display())]
    Extract { archive: PathBuf, message: String },

    /// The tool ran and exited unsuccessfully
    #[error("codeql {phase} failed with {}{}", describe_code(*code), format_tail(output_tail))]
    ToolInvocation {
        phase: ToolPhase,
        code: Option<i32>,
        output_tail: Vec<String>,
    },

    /// The tool could not be started
    #[error("Failed to start codeql {phase} ({}): {source}", program.display())]
    Spawn {
        phase: ToolPhase,
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("codeql {phase} did not finish within {}s and was killed", after.as_secs())]
    TimedOut { phase: ToolPhase, after: Duration },

    #[error("codeql {phase} was cancelled")]
    Cancelled { phase: ToolPhase },

    /// Interrupted while no tool invocation was running
    #[error("Scan interrupted")]
    Interrupted,

    /// Analysis requested against a database that does not exist or is incomplete
    #[error("Database {} is missing or incomplete; database create must succeed first", database.display())]
    Precondition { database: PathBuf },

    /// Analysis reported success but did not write its results
    #[error("Analysis finished but no results were written to {}", path.display())]
    MissingResults { path: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        ScanError::Io {
            context: context.into(),
            source,
        }
    }

    /// Phase of the tool invocation this error belongs to, if any
    pub fn phase(&self) -> Option<ToolPhase> {
        match self {
            ScanError::ToolInvocation { phase, .. }
            | ScanError::Spawn { phase, .. }
            | ScanError::TimedOut { phase, .. }
            | ScanError::Cancelled { phase } => Some(*phase),
            _ => None,
        }
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn format_tail(lines: &[String]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        format!("\nLast output:\n  {}", lines.join("\n  "))
    }
}
