//! codeql-scan - CodeQL driver for continuous-integration jobs
//!
//! Locates (or downloads) the CodeQL CLI, creates an analysis database by tracing a
//! build command, then analyzes that database with a query pack and writes SARIF
//! results.
//!
//! # Example Usage
//!
//! ```no_run
//! use codeql_scan::{ScanConfig, ScanRequest, Scanner};
//!
//! async fn scan() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanConfig::from_env()?;
//!     let request = ScanRequest::new(
//!         "./app",
//!         "dotnet build",
//!         "codeql-db-app",
//!         "csharp",
//!         "codeql/csharp-all",
//!         "codeql-results.sarif",
//!         config.threads,
//!     );
//!
//!     let outcome = Scanner::new(config)?.run(&request).await?;
//!     println!("Wrote sarif to {}", outcome.sarif_path.display());
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`locator`]: Tool discovery and bundle download
//! - [`runner`]: Subprocess execution with captured output and timeouts
//! - [`codeql`]: Argument lists for the CodeQL subcommands
//! - [`scan`]: The locate → create → analyze sequence

pub mod cli;
pub mod codeql;
pub mod config;
pub mod error;
pub mod locator;
pub mod progress;
pub mod runner;
pub mod scan;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, Platform, ScanConfig};
pub use error::ScanError;
pub use locator::{BundleFetcher, HttpBundleFetcher, ToolLocator};
pub use runner::{
    CommandSpec, Interrupt, InvocationStatus, ProcessRunner, TokioProcessRunner, ToolOutput,
};
pub use scan::{ScanOutcome, ScanRequest, Scanner};
pub use types::{AnalysisSpec, BuildSpec, ExtraPack, LocationSource, ToolLocation, ToolPhase};
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
