//! Error types for Harvest.
//!
//! `HarvestError` covers every condition that aborts an acquisition request
//! before any file is attempted. Per-file conditions (download failures,
//! hash mismatches, incomplete segment sets) are not errors at this level:
//! they are collected into the outcome map, see
//! [`FileFailure`](crate::acquisition::FileFailure).

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Harvest library.
#[derive(Debug, Error)]
pub enum HarvestError {
    // Reference errors
    #[error("Invalid model reference: {input}")]
    InvalidReference { input: String },

    #[error("Could not resolve model for version {version_id}: {message}")]
    UnresolvedReference { version_id: u64, message: String },

    #[error("Not found on {source_name}: {what}")]
    NotFound { source_name: String, what: String },

    #[error("No catalog enabled for source {0}")]
    SourceUnavailable(String),

    // Placement errors
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// HTTP status when the remote answered at all.
        status: Option<u16>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Harvest operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

impl From<std::io::Error> for HarvestError {
    fn from(err: std::io::Error) -> Self {
        HarvestError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        HarvestError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HarvestError::Timeout(std::time::Duration::from_secs(0))
        } else {
            HarvestError::Network {
                message: err.to_string(),
                status: err.status().map(|s| s.as_u16()),
            }
        }
    }
}

impl HarvestError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        HarvestError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    pub(crate) fn not_found(source_name: &str, what: impl Into<String>) -> Self {
        HarvestError::NotFound {
            source_name: source_name.to_string(),
            what: what.into(),
        }
    }

    /// Stable short name of the failure class, used in outcome reports.
    pub fn kind(&self) -> &'static str {
        match self {
            HarvestError::InvalidReference { .. } => "invalid_reference",
            HarvestError::UnresolvedReference { .. } => "unresolved_reference",
            HarvestError::NotFound { .. } => "not_found",
            HarvestError::SourceUnavailable(_) => "source_unavailable",
            HarvestError::UnknownCategory(_) => "unknown_category",
            HarvestError::Network { .. } | HarvestError::Timeout(_) => "network",
            HarvestError::Io { .. } => "io",
            HarvestError::Json { .. } => "json",
            HarvestError::Config { .. } => "config",
            HarvestError::Other(_) => "other",
        }
    }
}
