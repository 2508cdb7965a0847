//! Values passed between the locator, the argument builders and the scanner

use std::fmt;
use std::path::{Path, PathBuf};

/// Keyword selecting the Windows driver supplemental query pack
pub const WINDOWS_DRIVER_PACK: &str = "WINDOWS_DRIVER";

/// Directory of the Windows driver supplemental tools, relative to the checkout root
const WINDOWS_DRIVER_PACK_DIR: &str = "Windows-Driver-Developer-Supplemental-Tools";

/// Where a tool installation was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    /// Default directory relative to the working directory
    Local,
    /// Under the user's home directory
    Home,
    /// Under the Windows program-files root
    ProgramFiles,
    /// Freshly downloaded and extracted bundle
    Fetched,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LocationSource::Local => "local",
            LocationSource::Home => "home",
            LocationSource::ProgramFiles => "program files",
            LocationSource::Fetched => "fetched",
        };
        write!(f, "{}", name)
    }
}

/// Resolved, existing CodeQL executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolLocation {
    executable: PathBuf,
    source: LocationSource,
    searched: Vec<PathBuf>,
}

impl ToolLocation {
    pub(crate) fn new(executable: PathBuf, source: LocationSource, searched: Vec<PathBuf>) -> Self {
        Self {
            executable,
            source,
            searched,
        }
    }

    /// Absolute path of the executable
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn source(&self) -> LocationSource {
        self.source
    }

    /// Candidate directories that were checked, in search order
    pub fn searched(&self) -> &[PathBuf] {
        &self.searched
    }
}

/// Parameters for `database create`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    pub source_root: PathBuf,
    pub build_command: String,
    pub db_name: String,
    pub language: String,
    pub threads: u32,
}

/// Parameters for `database analyze`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisSpec {
    pub db_name: String,
    pub queries: String,
    pub threads: u32,
    pub output: PathBuf,
}

/// The three tool invocations a scan can make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolPhase {
    PackInstall,
    DatabaseCreate,
    DatabaseAnalyze,
}

impl fmt::Display for ToolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolPhase::PackInstall => "pack install",
            ToolPhase::DatabaseCreate => "database create",
            ToolPhase::DatabaseAnalyze => "database analyze",
        };
        write!(f, "{}", name)
    }
}

/// Supplementary query pack installed before database creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraPack {
    /// Windows driver developer supplemental tools checked out next to the working directory
    WindowsDriver,
    /// Pack at an explicit path
    Path(PathBuf),
}

impl ExtraPack {
    /// Parses a comma separated list, skipping empty entries
    pub fn parse_list(value: &str) -> Vec<Self> {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                if entry.eq_ignore_ascii_case(WINDOWS_DRIVER_PACK) {
                    ExtraPack::WindowsDriver
                } else {
                    ExtraPack::Path(PathBuf::from(entry))
                }
            })
            .collect()
    }

    /// Filesystem path of the pack for a run rooted at `work_dir`
    pub fn resolve(&self, work_dir: &Path) -> PathBuf {
        match self {
            ExtraPack::WindowsDriver => work_dir
                .parent()
                .unwrap_or(work_dir)
                .join(WINDOWS_DRIVER_PACK_DIR)
                .join("src"),
            ExtraPack::Path(path) if path.is_absolute() => path.clone(),
            ExtraPack::Path(path) => work_dir.join(path),
        }
    }
}
