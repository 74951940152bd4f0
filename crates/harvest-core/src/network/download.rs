//! Streaming file downloader with progress reporting and cancellation.
//!
//! Bodies are written chunk by chunk to `<destination>.part` while a SHA-256
//! digest is computed, then renamed onto the destination. A failed or
//! cancelled transfer leaves the `.part` file on disk.

use crate::cancel::CancellationToken;
use crate::config::NetworkConfig;
use crate::error::Result;
use crate::network::client::HttpClient;
use crate::network::retry::{is_transient_status, retry_async, RetryConfig};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Progress information for a download, reported after every chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    /// Total bytes, when the response declared a length.
    pub total_bytes: Option<u64>,
    pub chunks: u64,
    /// Percentage complete (0-100). `None` when the total is unknown.
    pub percent: Option<f64>,
}

impl DownloadProgress {
    pub(crate) fn new(bytes_downloaded: u64, total_bytes: Option<u64>, chunks: u64) -> Self {
        let percent = total_bytes.map(|total| {
            if total > 0 {
                (bytes_downloaded as f64 / total as f64) * 100.0
            } else {
                100.0
            }
        });

        Self {
            bytes_downloaded,
            total_bytes,
            chunks,
            percent,
        }
    }
}

/// Progress callback shared between the engine and its transfers.
pub type ProgressCallback = Arc<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Failure class of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadErrorKind {
    /// Connection, TLS, or mid-stream transport failure.
    Network,
    /// The server answered with a non-2xx status.
    HttpStatus(u16),
    /// Creating, writing, or renaming the local file failed.
    IoWrite,
    Cancelled,
}

impl fmt::Display for DownloadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadErrorKind::Network => write!(f, "network"),
            DownloadErrorKind::HttpStatus(code) => write!(f, "http {}", code),
            DownloadErrorKind::IoWrite => write!(f, "io"),
            DownloadErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Error from a single download.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct DownloadError {
    pub kind: DownloadErrorKind,
    pub message: String,
}

impl DownloadError {
    pub fn new(kind: DownloadErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(DownloadErrorKind::Cancelled, "Operation was cancelled")
    }

    fn network(err: reqwest::Error) -> Self {
        Self::new(DownloadErrorKind::Network, err.to_string())
    }

    fn io(path: &Path, err: std::io::Error) -> Self {
        Self::new(
            DownloadErrorKind::IoWrite,
            format!("{}: {}", path.display(), err),
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == DownloadErrorKind::Cancelled
    }

    /// Transport failures and 429/5xx statuses are transient.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            DownloadErrorKind::Network => true,
            DownloadErrorKind::HttpStatus(code) => is_transient_status(code),
            DownloadErrorKind::IoWrite | DownloadErrorKind::Cancelled => false,
        }
    }
}

/// Result of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the bytes written.
    pub sha256: String,
}

/// Streams one URL to one path. Holds no per-download state, so a single
/// instance serves any number of concurrent transfers.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: HttpClient,
    temp_suffix: &'static str,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(HttpClient::for_downloads()?))
    }

    pub fn with_client(http: HttpClient) -> Self {
        Self {
            http,
            temp_suffix: NetworkConfig::DOWNLOAD_TEMP_SUFFIX,
        }
    }

    /// Path of the in-progress file for `destination`.
    pub fn temp_path(&self, destination: &Path) -> PathBuf {
        let mut name = destination.as_os_str().to_owned();
        name.push(self.temp_suffix);
        PathBuf::from(name)
    }

    /// Download `url` to `destination`.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        on_progress: Option<&ProgressCallback>,
    ) -> std::result::Result<DownloadReport, DownloadError> {
        self.download_with(url, None, destination, on_progress, &CancellationToken::new())
            .await
    }

    /// Download with an optional bearer token, aborting when `cancel` fires.
    pub async fn download_with(
        &self,
        url: &str,
        bearer: Option<&str>,
        destination: &Path,
        on_progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> std::result::Result<DownloadReport, DownloadError> {
        if cancel.is_cancelled() {
            return Err(DownloadError::cancelled());
        }

        let mut request = self.http.inner().get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        debug!("Starting download of {} to {}", url, destination.display());
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::cancelled()),
            response = request.send() => response.map_err(DownloadError::network)?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::new(
                DownloadErrorKind::HttpStatus(status.as_u16()),
                format!("Download of {} failed with status {}", url, status),
            ));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let temp_path = self.temp_path(destination);
        let mut file = File::create(&temp_path)
            .await
            .map_err(|e| DownloadError::io(&temp_path, e))?;

        let total_bytes = response.content_length();
        let streamed = stream_body(
            response,
            &mut file,
            &temp_path,
            total_bytes,
            on_progress,
            cancel,
        )
        .await;

        // Flush on every exit path; the partial file stays for inspection.
        let flushed = file.flush().await;
        drop(file);
        let report = streamed?;
        flushed.map_err(|e| DownloadError::io(&temp_path, e))?;

        tokio::fs::rename(&temp_path, destination)
            .await
            .map_err(|e| DownloadError::io(destination, e))?;

        info!(
            "Downloaded {} bytes to {}",
            report.bytes,
            destination.display()
        );
        Ok(report)
    }

    /// [`Self::download_with`] wrapped in exponential backoff. Only
    /// transient failures are retried; cancellation during a wait ends the
    /// transfer as cancelled.
    pub async fn download_with_retry(
        &self,
        url: &str,
        bearer: Option<&str>,
        destination: &Path,
        on_progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
        retry: &RetryConfig,
    ) -> std::result::Result<DownloadReport, DownloadError> {
        let (result, stats) = retry_async(
            retry,
            cancel,
            || self.download_with(url, bearer, destination, on_progress, cancel),
            DownloadError::is_retryable,
        )
        .await;

        if stats.attempts > 1 {
            debug!(
                "Download of {} took {} attempts (total delay: {:?})",
                url, stats.attempts, stats.total_delay
            );
        }
        if stats.interrupted {
            return Err(DownloadError::cancelled());
        }
        result
    }
}

async fn stream_body(
    response: reqwest::Response,
    file: &mut File,
    temp_path: &Path,
    total_bytes: Option<u64>,
    on_progress: Option<&ProgressCallback>,
    cancel: &CancellationToken,
) -> std::result::Result<DownloadReport, DownloadError> {
    let mut hasher = Sha256::new();
    let mut bytes_downloaded: u64 = 0;
    let mut chunks: u64 = 0;
    let mut stream = response.bytes_stream();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::cancelled()),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(DownloadError::network)?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(temp_path, e))?;
        hasher.update(&chunk);

        bytes_downloaded += chunk.len() as u64;
        chunks += 1;
        if let Some(callback) = on_progress {
            callback(&DownloadProgress::new(bytes_downloaded, total_bytes, chunks));
        }
    }

    Ok(DownloadReport {
        bytes: bytes_downloaded,
        sha256: hex::encode(hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_download_progress_known_total() {
        let progress = DownloadProgress::new(50, Some(200), 3);
        assert_eq!(progress.percent, Some(25.0));
        assert_eq!(progress.chunks, 3);
    }

    #[test]
    fn test_download_progress_unknown_total() {
        let progress = DownloadProgress::new(50, None, 1);
        assert_eq!(progress.bytes_downloaded, 50);
        assert_eq!(progress.percent, None);
    }

    #[test]
    fn test_error_retryability() {
        assert!(DownloadError::new(DownloadErrorKind::Network, "reset").is_retryable());
        assert!(DownloadError::new(DownloadErrorKind::HttpStatus(503), "busy").is_retryable());
        assert!(!DownloadError::new(DownloadErrorKind::HttpStatus(404), "gone").is_retryable());
        assert!(!DownloadError::new(DownloadErrorKind::IoWrite, "disk full").is_retryable());
        assert!(!DownloadError::cancelled().is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = DownloadError::new(DownloadErrorKind::HttpStatus(500), "boom");
        assert_eq!(err.to_string(), "http 500 error: boom");
    }

    #[test]
    fn test_temp_path_appends_suffix() {
        let downloader = Downloader::new().unwrap();
        assert_eq!(
            downloader.temp_path(Path::new("/models/a.safetensors")),
            PathBuf::from("/models/a.safetensors.part")
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = Downloader::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = downloader
            .download_with(
                "http://127.0.0.1:9/never",
                None,
                &temp_dir.path().join("x.bin"),
                None,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
