//! Structured result of one acquisition request.
//!
//! Early aborts (nothing attempted) are `Err(HarvestError)` from the engine.
//! Once transfers start, every manifest file gets exactly one
//! [`FileOutcome`] and the request returns `Ok(AcquisitionOutcome)`.

use super::category::DestinationCategory;
use super::reference::{SourceKind, SourceReference};
use crate::network::DownloadError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a single file did not end up in place.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FileFailure {
    #[error("download failed: {0}")]
    Download(DownloadError),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// The file's segment group cannot be completed.
    #[error("segment group '{group}' is incomplete, missing segments {missing:?}")]
    IncompleteSegments { group: String, missing: Vec<u32> },

    #[error(
        "segment group '{group}' has inconsistent metadata: totals {totals:?}, \
         out-of-range indices {out_of_range:?}"
    )]
    InconsistentSegmentMetadata {
        group: String,
        totals: Vec<u32>,
        out_of_range: Vec<u32>,
    },

    #[error("cancelled")]
    Cancelled,
}

/// Terminal state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Succeeded { bytes: u64, sha256: String },
    Failed { failure: FileFailure },
}

impl FileStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, FileStatus::Succeeded { .. })
    }

    pub fn failure(&self) -> Option<&FileFailure> {
        match self {
            FileStatus::Failed { failure } => Some(failure),
            FileStatus::Succeeded { .. } => None,
        }
    }
}

impl From<FileFailure> for FileStatus {
    fn from(failure: FileFailure) -> Self {
        FileStatus::Failed { failure }
    }
}

/// Placement and result of one manifest file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    /// Remote file name.
    pub name: String,
    pub category: DestinationCategory,
    pub destination: PathBuf,
    /// Key of the segment group the file belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_group: Option<String>,
    #[serde(flatten)]
    pub status: FileStatus,
}

/// Result of one segment group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOutcome {
    pub key: String,
    pub base_name: String,
    pub total_segments: u32,
    pub directory: PathBuf,
    /// `None` when every segment is in place.
    pub failure: Option<FileFailure>,
}

impl GroupOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Process exit tiers shared by the `download` and `batch` commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeTier {
    Success = 0,
    Failure = 1,
    Partial = 2,
}

impl OutcomeTier {
    pub fn exit_code(self) -> i32 {
        self as i32
    }

    /// Tier for `succeeded` out of `total` attempted units.
    pub fn from_counts(succeeded: usize, total: usize) -> Self {
        if total > 0 && succeeded == total {
            OutcomeTier::Success
        } else if succeeded == 0 {
            OutcomeTier::Failure
        } else {
            OutcomeTier::Partial
        }
    }
}

/// Outcome of a request that got as far as transferring files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquisitionOutcome {
    pub reference: SourceReference,
    pub source: SourceKind,
    pub title: String,
    /// One entry per manifest file, in manifest order.
    pub files: Vec<FileOutcome>,
    pub groups: Vec<GroupOutcome>,
    /// Sidecar written for the primary artifact, if any.
    pub provenance: Option<PathBuf>,
    pub all_succeeded: bool,
}

impl AcquisitionOutcome {
    pub fn file(&self, name: &str) -> Option<&FileOutcome> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn group(&self, key: &str) -> Option<&GroupOutcome> {
        self.groups.iter().find(|g| g.key == key)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.status.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| !f.status.is_success())
    }

    /// Destinations of the files that were written.
    pub fn written_paths(&self) -> Vec<&Path> {
        self.succeeded().map(|f| f.destination.as_path()).collect()
    }

    pub fn tier(&self) -> OutcomeTier {
        OutcomeTier::from_counts(self.succeeded().count(), self.files.len())
    }
}
