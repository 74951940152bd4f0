//! Network utilities: HTTP clients, streaming downloads, retries.

mod client;
mod download;
mod retry;

pub use client::HttpClient;
pub use download::{
    DownloadError, DownloadErrorKind, DownloadProgress, DownloadReport, Downloader,
    ProgressCallback,
};
pub use retry::{retry_async, RetryConfig, RetryStats};
