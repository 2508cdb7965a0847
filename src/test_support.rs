//! Fakes and fixtures shared by unit tests

use crate::codeql::DATABASE_MARKER;
use crate::config::{Platform, ScanConfig, PROGRAM_FILES_VAR};
use crate::error::ScanError;
use crate::locator::{BundleFetcher, FetchedArchive};
use crate::runner::{CommandSpec, InvocationStatus, ProcessRunner, ToolOutput};
use crate::types::ToolPhase;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const FAKE_TOOL_SCRIPT: &[u8] = b"#!/bin/sh\nexit 0\n";

/// Config rooted at `work_dir` with no home directory
pub fn scan_config(work_dir: &Path) -> ScanConfig {
    let program_files = work_dir.join("program-files").to_string_lossy().into_owned();
    ScanConfig::from_lookup(Platform::current(), work_dir.to_path_buf(), None, |key| {
        (key == PROGRAM_FILES_VAR).then(|| program_files.clone())
    })
    .expect("test config is valid")
}

/// Writes an executable fake tool into `dir` and returns its path
pub fn install_fake_tool(dir: &Path) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let executable = dir.join(Platform::current().executable_name());
    fs::write(&executable, FAKE_TOOL_SCRIPT).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&executable, fs::Permissions::from_mode(0o755)).unwrap();
    }

    executable
}

/// A gzipped tarball holding `<dir>/<executable>`
pub fn bundle_tar_gz(dir: &str, executable: &str) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));

    let mut header = tar::Header::new_gnu();
    header.set_size(FAKE_TOOL_SCRIPT.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, format!("{}/{}", dir, executable), FAKE_TOOL_SCRIPT)
        .unwrap();

    builder.into_inner().unwrap().finish().unwrap()
}

/// Fetcher that serves a fixed payload (or fails) and counts calls
pub struct CountingFetcher {
    payload: Option<Vec<u8>>,
    urls: Mutex<Vec<String>>,
}

impl CountingFetcher {
    pub fn serving(payload: Vec<u8>) -> Self {
        Self {
            payload: Some(payload),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            payload: None,
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BundleFetcher for CountingFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<FetchedArchive, ScanError> {
        self.urls.lock().unwrap().push(url.to_string());

        let payload = self.payload.as_ref().ok_or_else(|| ScanError::Fetch {
            url: url.to_string(),
            message: "network unreachable".to_string(),
        })?;
        fs::write(dest, payload).map_err(|e| ScanError::io("write archive", e))?;

        Ok(FetchedArchive {
            path: dest.to_path_buf(),
            size: payload.len() as u64,
            sha256: hex::encode(Sha256::digest(payload)),
        })
    }
}

/// Runner that records invocations and imitates the CodeQL side effects
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<(ToolPhase, CommandSpec)>>,
    exit_codes: HashMap<ToolPhase, i32>,
    skip_database: bool,
    skip_results: bool,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `phase` exit with `code`
    pub fn failing(mut self, phase: ToolPhase, code: i32) -> Self {
        self.exit_codes.insert(phase, code);
        self
    }

    /// Report success for `database create` without writing a database
    pub fn without_database(mut self) -> Self {
        self.skip_database = true;
        self
    }

    /// Report success for `database analyze` without writing results
    pub fn without_results(mut self) -> Self {
        self.skip_results = true;
        self
    }

    pub fn calls(&self) -> Vec<(ToolPhase, CommandSpec)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<ToolPhase> {
        self.calls().into_iter().map(|(phase, _)| phase).collect()
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(&self, phase: ToolPhase, command: &CommandSpec) -> Result<ToolOutput, ScanError> {
        self.calls.lock().unwrap().push((phase, command.clone()));

        let code = self.exit_codes.get(&phase).copied();
        let status = match code {
            Some(code) => InvocationStatus::Failed { code: Some(code) },
            None => InvocationStatus::Succeeded,
        };

        if code.is_none() {
            let base = command.current_dir.clone().unwrap_or_default();
            match phase {
                ToolPhase::DatabaseCreate if !self.skip_database => {
                    let database = base.join(&command.args[3]);
                    fs::create_dir_all(&database).unwrap();
                    fs::write(database.join(DATABASE_MARKER), "finalised: true\n").unwrap();
                }
                ToolPhase::DatabaseAnalyze if !self.skip_results => {
                    let output = command.flag_value("--output").unwrap();
                    let output = base.join(output);
                    if let Some(parent) = output.parent() {
                        fs::create_dir_all(parent).unwrap();
                    }
                    fs::write(output, "{\"version\":\"2.1.0\",\"runs\":[]}").unwrap();
                }
                _ => {}
            }
        }

        Ok(ToolOutput {
            phase,
            status,
            stdout_tail: Vec::new(),
            stderr_tail: vec![format!("{} finished", phase)],
            duration: Duration::from_millis(1),
        })
    }
}
