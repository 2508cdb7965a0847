//! Bundle download and extraction

use crate::error::ScanError;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Archive written to disk by a [`BundleFetcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArchive {
    pub path: PathBuf,
    pub size: u64,
    /// Lowercase hex SHA-256 of the archive bytes
    pub sha256: String,
}

/// Downloads a bundle archive to a local file
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<FetchedArchive, ScanError>;
}

/// HTTP fetcher streaming the response body to disk
pub struct HttpBundleFetcher {
    client: reqwest::Client,
}

impl HttpBundleFetcher {
    pub fn new() -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("codeql-scan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScanError::Fetch {
                url: String::new(),
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl BundleFetcher for HttpBundleFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<FetchedArchive, ScanError> {
        let fetch_error = |message: String| ScanError::Fetch {
            url: url.to_string(),
            message,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(format!("{} (check network connectivity)", e)))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("HTTP {}", response.status())));
        }

        let progress = progress_bar(response.content_length());
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ScanError::io(format!("Failed to create {}", dest.display()), e))?;

        let mut hasher = Sha256::new();
        let mut size = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_error(format!("download interrupted: {}", e)))?
        {
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| ScanError::io(format!("Failed to write {}", dest.display()), e))?;
            size += chunk.len() as u64;
            progress.inc(chunk.len() as u64);
        }
        file.flush()
            .await
            .map_err(|e| ScanError::io(format!("Failed to write {}", dest.display()), e))?;
        progress.finish_and_clear();

        if size == 0 {
            return Err(fetch_error("server returned an empty body".to_string()));
        }

        debug!(bytes = size, path = %dest.display(), "Bundle downloaded");

        Ok(FetchedArchive {
            path: dest.to_path_buf(),
            size,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

fn progress_bar(total: Option<u64>) -> ProgressBar {
    if !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    match total {
        Some(total) => {
            let style = ProgressStyle::with_template(
                "{spinner} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
            ProgressBar::new(total).with_style(style)
        }
        None => ProgressBar::new_spinner(),
    }
}

/// Compares a downloaded archive against the expected digest
pub fn verify_checksum(archive: &FetchedArchive, expected: &str) -> Result<(), ScanError> {
    if archive.sha256.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(ScanError::Extract {
            archive: archive.path.clone(),
            message: format!(
                "SHA-256 mismatch: expected {}, got {}",
                expected, archive.sha256
            ),
        })
    }
}

/// Unpacks a `.tar.gz` archive into `dest`
///
/// Blocking; call from `spawn_blocking` inside async code.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), ScanError> {
    let extract_error = |message: String| ScanError::Extract {
        archive: archive.to_path_buf(),
        message,
    };

    let file = File::open(archive).map_err(|e| extract_error(format!("cannot open: {}", e)))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(true);
    tar.unpack(dest)
        .map_err(|e| extract_error(format!("archive is corrupt or incomplete: {}", e)))?;

    Ok(())
}
