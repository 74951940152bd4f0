//! Batch acquisition from a JSON download list.
//!
//! ```json
//! {
//!   "downloads": [
//!     { "name": "base", "source": "civitai", "reference": "4201" },
//!     { "source": "huggingface", "reference": "org/repo", "category_override": "vae" }
//!   ]
//! }
//! ```
//!
//! Entries run one after another. A failing entry never stops the batch.

use super::category::DestinationCategory;
use super::engine::{AcquireOptions, AcquisitionEngine};
use super::outcome::{AcquisitionOutcome, OutcomeTier};
use super::reference::SourceKind;
use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, warn};

/// One requested download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Label used in logs and reports.
    #[serde(default)]
    pub name: Option<String>,
    pub source: SourceKind,
    pub reference: String,
    #[serde(default)]
    pub category_override: Option<DestinationCategory>,
    #[serde(default)]
    pub filename_override: Option<String>,
    #[serde(default)]
    pub expected_hash: Option<String>,
}

impl BatchEntry {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.reference)
    }
}

/// Parsed batch file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub downloads: Vec<BatchEntry>,
}

impl BatchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| HarvestError::io_with_path(e, path))?;
        Self::from_json(&contents).map_err(|e| match e {
            HarvestError::Config { message } => HarvestError::Config {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| HarvestError::Config {
            message: format!("Invalid batch file: {}", e),
        })
    }
}

/// Result of one batch entry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BatchEntryStatus {
    /// Transfers were attempted; see the outcome for per-file results.
    Completed { outcome: AcquisitionOutcome },
    /// Nothing was attempted.
    Aborted { kind: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntryReport {
    pub label: String,
    pub reference: String,
    #[serde(flatten)]
    pub status: BatchEntryStatus,
}

impl BatchEntryReport {
    pub fn is_success(&self) -> bool {
        matches!(&self.status, BatchEntryStatus::Completed { outcome } if outcome.all_succeeded)
    }
}

/// Summary of a whole batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub entries: Vec<BatchEntryReport>,
}

impl BatchReport {
    pub fn tier(&self) -> OutcomeTier {
        OutcomeTier::from_counts(self.succeeded, self.total)
    }
}

/// Run every entry of `config` through `engine`.
///
/// `base` supplies the progress callback and cancellation token shared by
/// all entries; per-entry overrides come from the entry itself. Once `base`
/// is cancelled the remaining entries are reported as aborted.
pub async fn run_batch(
    engine: &AcquisitionEngine,
    config: &BatchConfig,
    base: &AcquireOptions,
) -> BatchReport {
    let total = config.downloads.len();
    let mut entries = Vec::with_capacity(total);

    for (position, entry) in config.downloads.iter().enumerate() {
        info!(
            "[{}/{}] {} ({})",
            position + 1,
            total,
            entry.label(),
            entry.source
        );

        let status = if base.cancel.is_cancelled() {
            warn!("Skipping {}: batch cancelled", entry.label());
            BatchEntryStatus::Aborted {
                kind: "cancelled".to_string(),
                message: "batch cancelled".to_string(),
            }
        } else {
            let options = AcquireOptions {
                source_hint: Some(entry.source),
                category_override: entry.category_override,
                filename_override: entry.filename_override.clone(),
                expected_hash: entry.expected_hash.clone(),
                ..base.clone()
            };
            match engine.acquire(&entry.reference, options).await {
                Ok(outcome) => BatchEntryStatus::Completed { outcome },
                Err(e) => {
                    error!("{} failed: {}", entry.label(), e);
                    BatchEntryStatus::Aborted {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    }
                }
            }
        };

        entries.push(BatchEntryReport {
            label: entry.label().to_string(),
            reference: entry.reference.clone(),
            status,
        });
    }

    let succeeded = entries.iter().filter(|e| e.is_success()).count();
    info!("Batch finished: {}/{} entries succeeded", succeeded, total);
    BatchReport {
        total,
        succeeded,
        entries,
    }
}
