//! Structured logging setup for codeql-scan
//!
//! Logs go to stderr through `tracing-subscriber`. CodeQL's own output is forwarded
//! under the `codeql` target so it can be filtered separately from the wrapper's
//! messages.
//!
//! # Example
//!
//! ```no_run
//! use codeql_scan::util::logging;
//!
//! // With environment: CODEQL_SCAN_LOG_LEVEL=debug
//! logging::init_from_env();
//!
//! tracing::info!("Application started");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ensures logging is only initialized once
static INIT: Once = Once::new();

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level to display
    pub level: Level,

    /// Use JSON output format (for log shippers on CI agents)
    pub use_json: bool,

    /// Include the module target (e.g., codeql_scan::locator) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Reads `CODEQL_SCAN_LOG_LEVEL` and `CODEQL_SCAN_LOG_JSON`
    pub fn from_env() -> Self {
        let level_str = env::var("CODEQL_SCAN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let use_json = env::var("CODEQL_SCAN_LOG_JSON")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        Self {
            level: parse_level(&level_str),
            use_json,
            ..Default::default()
        }
    }

    /// Filter directives applied when `RUST_LOG` is not set
    fn directives(&self) -> Vec<String> {
        vec![
            format!("codeql_scan={}", self.level),
            format!("codeql={}", self.level),
            "hyper=warn".to_string(),
            "reqwest=warn".to_string(),
        ]
    }
}

/// Parses a log level from a string, case-insensitively
///
/// ```
/// use codeql_scan::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("invalid"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// Initializes the logging system; later calls are ignored
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = if env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            config
                .directives()
                .iter()
                .filter_map(|d| d.parse::<Directive>().ok())
                .fold(EnvFilter::new(Level::WARN.to_string()), |filter, directive| {
                    filter.add_directive(directive)
                })
        };

        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init();
        } else {
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    });
}

/// Initializes logging from `CODEQL_SCAN_LOG_*` variables and `RUST_LOG`
pub fn init_from_env() {
    init_logging(LoggingConfig::from_env());
}
