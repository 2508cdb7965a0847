//! Configuration management for codeql-scan
//!
//! All tuning is read from environment variables once at startup and frozen into
//! an immutable [`ScanConfig`] that is passed to every operation. The command line
//! only carries the six positional scan arguments.
//!
//! # Environment Variables
//!
//! - `CODEQL_SCAN_TOOL_DIR`: Relative (or absolute) CodeQL directory - default: "codeql"
//! - `CODEQL_SCAN_BUNDLE_URL`: Bundle download URL - default: the pinned platform bundle
//! - `CODEQL_SCAN_BUNDLE_SHA256`: Expected SHA-256 of the bundle archive - default: unset
//! - `CODEQL_SCAN_THREADS`: Value passed to `--threads` - default: "8"
//! - `CODEQL_SCAN_OVERWRITE`: Pass `--overwrite` to `database create` - default: "true"
//! - `CODEQL_SCAN_EXTRA_PACKS`: Comma separated pack paths, or `WINDOWS_DRIVER` - default: empty
//! - `CODEQL_SCAN_TIMEOUT_SECS`: Per-invocation timeout, 0 disables - default: "7200"
//! - `CODEQL_SCAN_VERIFY_DATABASE`: Check the database before analysis - default: "true"
//! - `ProgramFiles`: Windows install root, required on Windows and ignored elsewhere
//!
//! # Example
//!
//! ```no_run
//! use codeql_scan::ScanConfig;
//!
//! let config = ScanConfig::from_env().expect("Invalid configuration");
//! println!("Bundle: {}", config.bundle_url);
//! ```

use crate::types::ExtraPack;
use std::env;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default values for configuration
pub const DEFAULT_TOOL_DIR: &str = "codeql";
pub const DEFAULT_ARCHIVE_NAME: &str = "codeql.tar.gz";
pub const DEFAULT_THREADS: u32 = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 2 * 60 * 60;

/// Name of the Windows program-files variable
pub const PROGRAM_FILES_VAR: &str = "ProgramFiles";

const BUNDLE_RELEASE_URL: &str =
    "https://github.com/github/codeql-action/releases/download/codeql-bundle-20230304";

/// Host platform, used to pick the bundle flavour and executable name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Detects the platform this binary was compiled for
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Suffix used by the release bundles for this platform
    pub fn bundle_suffix(self) -> &'static str {
        match self {
            Platform::Linux => "linux64",
            Platform::MacOs => "osx64",
            Platform::Windows => "win64",
        }
    }

    /// File name of the CodeQL entry point inside the tool directory
    pub fn executable_name(self) -> &'static str {
        match self {
            Platform::Windows => "codeql.exe",
            Platform::Linux | Platform::MacOs => "codeql",
        }
    }

    /// Whether the platform exposes a program-files install root
    pub fn has_program_files(self) -> bool {
        matches!(self, Platform::Windows)
    }

    pub fn bundle_url(self) -> String {
        format!(
            "{}/codeql-bundle-{}.tar.gz",
            BUNDLE_RELEASE_URL,
            self.bundle_suffix()
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Linux => "Linux",
            Platform::MacOs => "macOS",
            Platform::Windows => "Windows",
        };
        write!(f, "{}", name)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable the platform requires is not set
    #[error("{name} is not set; it is required on {platform}")]
    MissingEnv {
        name: &'static str,
        platform: Platform,
    },

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The command line did not carry exactly six positional arguments
    #[error("Expected 6 positional arguments, got {0}")]
    WrongArgumentCount(usize),

    #[error("Failed to determine working directory: {0}")]
    WorkingDirectory(#[source] io::Error),
}

/// Immutable scan configuration, built once at startup
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Host platform
    pub platform: Platform,

    /// Directory relative paths are resolved against; the bundle is extracted here
    pub work_dir: PathBuf,

    /// Default tool directory, searched first
    pub tool_dir: PathBuf,

    /// User home directory, if one could be determined
    pub home_dir: Option<PathBuf>,

    /// Program-files root; only ever set on Windows
    pub program_files: Option<PathBuf>,

    /// Release bundle URL used when no local tool is found
    pub bundle_url: String,

    /// File name of the downloaded archive inside `work_dir`
    pub archive_name: String,

    /// Expected lowercase hex SHA-256 of the archive
    pub bundle_sha256: Option<String>,

    /// Worker threads passed to the tool
    pub threads: u32,

    /// Request `--overwrite` when creating the database
    pub overwrite: bool,

    /// Packs installed before database creation
    pub extra_packs: Vec<ExtraPack>,

    /// Upper bound for a single tool invocation
    pub invocation_timeout: Option<Duration>,

    /// Check the database directory before analysis
    pub verify_database: bool,
}

impl ScanConfig {
    /// Loads the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let work_dir = env::current_dir().map_err(ConfigError::WorkingDirectory)?;
        Self::from_lookup(Platform::current(), work_dir, dirs::home_dir(), |key| {
            env::var(key).ok()
        })
    }

    /// Builds a configuration from an arbitrary variable lookup
    ///
    /// `ProgramFiles` is read eagerly: on Windows a missing value is reported here
    /// rather than when the locator first needs it.
    pub fn from_lookup<F>(
        platform: Platform,
        work_dir: PathBuf,
        home_dir: Option<PathBuf>,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let program_files = if platform.has_program_files() {
            let value = lookup(PROGRAM_FILES_VAR)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnv {
                    name: PROGRAM_FILES_VAR,
                    platform,
                })?;
            Some(PathBuf::from(value))
        } else {
            None
        };

        let tool_dir = lookup("CODEQL_SCAN_TOOL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOOL_DIR));

        let bundle_url = lookup("CODEQL_SCAN_BUNDLE_URL")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| platform.bundle_url());

        let bundle_sha256 = lookup("CODEQL_SCAN_BUNDLE_SHA256")
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty());

        let threads = parse_var(&lookup, "CODEQL_SCAN_THREADS")?.unwrap_or(DEFAULT_THREADS);
        let overwrite = parse_var(&lookup, "CODEQL_SCAN_OVERWRITE")?.unwrap_or(true);
        let verify_database = parse_var(&lookup, "CODEQL_SCAN_VERIFY_DATABASE")?.unwrap_or(true);

        let timeout_secs =
            parse_var(&lookup, "CODEQL_SCAN_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let invocation_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        let extra_packs = lookup("CODEQL_SCAN_EXTRA_PACKS")
            .map(|v| ExtraPack::parse_list(&v))
            .unwrap_or_default();

        let config = Self {
            platform,
            work_dir,
            tool_dir,
            home_dir,
            program_files,
            bundle_url,
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            bundle_sha256,
            threads,
            overwrite,
            extra_packs,
            invocation_timeout,
            verify_database,
        };
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::ValidationFailed(
                "CODEQL_SCAN_THREADS must be at least 1".to_string(),
            ));
        }

        if self.tool_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "CODEQL_SCAN_TOOL_DIR must not be empty".to_string(),
            ));
        }

        if !(self.bundle_url.starts_with("https://") || self.bundle_url.starts_with("http://")) {
            return Err(ConfigError::ValidationFailed(format!(
                "bundle URL must be http(s), got '{}'",
                self.bundle_url
            )));
        }

        if let Some(digest) = &self.bundle_sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "CODEQL_SCAN_BUNDLE_SHA256 must be 64 hex characters, got '{}'",
                    digest
                )));
            }
        }

        Ok(())
    }

    /// Resolves a caller-supplied path against the working directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }

    /// Where the bundle archive is written
    pub fn archive_path(&self) -> PathBuf {
        self.work_dir.join(&self.archive_name)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .to_lowercase()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::ParseError {
                field: name.to_string(),
                error: e.to_string(),
            }),
    }
}
