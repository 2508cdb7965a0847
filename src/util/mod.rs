//! Utility modules for codeql-scan

pub mod logging;

pub use logging::{init_from_env, init_logging, LoggingConfig};
