//! CodeQL discovery with a download fallback
//!
//! Candidates are checked in order: the default local directory, the user's home
//! directory, then (Windows only) the program-files root. When none contains an
//! executable, the pinned release bundle is downloaded into the working directory,
//! extracted, and the freshly extracted local directory is used.

pub mod fetch;

pub use fetch::{BundleFetcher, FetchedArchive, HttpBundleFetcher};

use crate::config::{ScanConfig, DEFAULT_TOOL_DIR};
use crate::error::ScanError;
use crate::types::{LocationSource, ToolLocation};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

pub struct ToolLocator<'a> {
    config: &'a ScanConfig,
    fetcher: &'a dyn BundleFetcher,
}

impl<'a> ToolLocator<'a> {
    pub fn new(config: &'a ScanConfig, fetcher: &'a dyn BundleFetcher) -> Self {
        Self { config, fetcher }
    }

    /// Candidate tool directories in search order
    pub fn candidates(&self) -> Vec<(LocationSource, PathBuf)> {
        let mut candidates = vec![(
            LocationSource::Local,
            self.config.resolve(&self.config.tool_dir),
        )];

        if let Some(home) = &self.config.home_dir {
            candidates.push((LocationSource::Home, home.join(DEFAULT_TOOL_DIR)));
        }

        if self.config.platform.has_program_files() {
            if let Some(program_files) = &self.config.program_files {
                candidates.push((
                    LocationSource::ProgramFiles,
                    program_files.join(DEFAULT_TOOL_DIR),
                ));
            }
        }

        candidates
    }

    /// First existing installation, without touching the network
    pub fn find_installed(&self) -> Option<ToolLocation> {
        let executable_name = self.config.platform.executable_name();
        let mut searched = Vec::new();

        for (source, dir) in self.candidates() {
            let executable = dir.join(executable_name);
            searched.push(dir.clone());
            if is_executable(&executable) {
                return Some(ToolLocation::new(executable, source, searched));
            }
            info!("Didn't find CodeQL in {}", dir.display());
        }

        None
    }

    /// Resolves the tool, downloading the bundle if nothing is installed
    pub async fn locate(&self) -> Result<ToolLocation, ScanError> {
        info!("Looking for CodeQL");

        let location = match self.find_installed() {
            Some(location) => location,
            None => self.fetch_bundle().await?,
        };

        info!("Using CodeQL from {}", location.executable().display());
        Ok(location)
    }

    async fn fetch_bundle(&self) -> Result<ToolLocation, ScanError> {
        let url = &self.config.bundle_url;
        let archive_path = self.config.archive_path();

        info!(url = %url, "Downloading CodeQL bundle");
        let start = Instant::now();
        let archive = self.fetcher.fetch(url, &archive_path).await?;
        debug!(
            bytes = archive.size,
            sha256 = %archive.sha256,
            elapsed_ms = start.elapsed().as_millis(),
            "Download complete"
        );

        if let Some(expected) = &self.config.bundle_sha256 {
            fetch::verify_checksum(&archive, expected)?;
        }

        info!(archive = %archive.path.display(), "Extracting CodeQL");
        let work_dir = self.config.work_dir.clone();
        let archive_file = archive.path.clone();
        tokio::task::spawn_blocking(move || fetch::extract_archive(&archive_file, &work_dir))
            .await
            .map_err(|e| ScanError::Extract {
                archive: archive.path.clone(),
                message: format!("extraction task failed: {}", e),
            })??;

        let dir = self.config.resolve(&self.config.tool_dir);
        let executable = dir.join(self.config.platform.executable_name());
        if !is_executable(&executable) {
            return Err(ScanError::Extract {
                archive: archive.path,
                message: format!("no executable found at {}", executable.display()),
            });
        }

        let searched = self.candidates().into_iter().map(|(_, dir)| dir).collect();
        Ok(ToolLocation::new(executable, LocationSource::Fetched, searched))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
