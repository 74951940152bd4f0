//! Provenance sidecars.
//!
//! A record is written once per successfully acquired primary artifact, as
//! `<artifact file name>.<source>.json` in the artifact's directory.

use super::category::DestinationCategory;
use super::reference::SourceKind;
use crate::catalog::{ResolvedIds, ResolvedManifest};
use crate::config::PathsConfig;
use crate::error::Result;
use crate::metadata::{atomic_read_json, atomic_write_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where and how an artifact was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub source: SourceKind,
    pub resolved_ids: ResolvedIds,
    pub title: String,
    pub type_tag: String,
    pub file_name: String,
    /// Whole artifact size; for a segmented artifact, the sum of its parts.
    pub size_bytes: u64,
    /// Number of parts of a segmented artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_count: Option<u32>,
    pub category: DestinationCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub tags: BTreeSet<String>,
    pub creator: String,
    pub download_timestamp: DateTime<Utc>,
}

impl ProvenanceRecord {
    /// Record for `file_name` from `manifest`, stamped now.
    pub fn from_manifest(
        manifest: &ResolvedManifest,
        file_name: impl Into<String>,
        size_bytes: u64,
        category: DestinationCategory,
        sha256: Option<String>,
    ) -> Self {
        Self {
            source: manifest.source,
            resolved_ids: manifest.ids.clone(),
            title: manifest.title.clone(),
            type_tag: manifest.type_tag.clone(),
            file_name: file_name.into(),
            size_bytes,
            segment_count: None,
            category,
            sha256,
            tags: manifest.tags.clone(),
            creator: manifest.creator.clone(),
            download_timestamp: Utc::now(),
        }
    }

    pub fn with_segment_count(mut self, count: u32) -> Self {
        self.segment_count = Some(count);
        self
    }
}

/// Serializes provenance records next to their artifacts.
pub struct ProvenanceWriter;

impl ProvenanceWriter {
    /// `<dir>/<artifact file name>.<source>.json`
    pub fn sidecar_path(artifact: &Path, source: SourceKind) -> PathBuf {
        let mut name = artifact
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{}", source.as_str(), PathsConfig::SIDECAR_EXTENSION));
        artifact.with_file_name(name)
    }

    /// Write (or overwrite) the sidecar for `artifact`.
    pub fn write(artifact: &Path, record: &ProvenanceRecord) -> Result<PathBuf> {
        let path = Self::sidecar_path(artifact, record.source);
        atomic_write_json(&path, record)?;
        debug!("Wrote provenance {}", path.display());
        Ok(path)
    }

    /// Read the sidecar for `artifact`, `None` when there is none.
    pub fn read(artifact: &Path, source: SourceKind) -> Result<Option<ProvenanceRecord>> {
        atomic_read_json(&Self::sidecar_path(artifact, source))
    }

    /// Whether any source has left a sidecar for `artifact`.
    pub fn exists_for(artifact: &Path) -> bool {
        SourceKind::ALL
            .iter()
            .any(|source| Self::sidecar_path(artifact, *source).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RemoteFile;
    use tempfile::TempDir;

    fn manifest() -> ResolvedManifest {
        ResolvedManifest::new(
            SourceKind::Civitai,
            ResolvedIds {
                model_id: Some(12345),
                version_id: Some(67890),
                ..Default::default()
            },
            "My Model",
            "Checkpoint",
            vec![RemoteFile::new("my-model.safetensors", 4, "https://x/m")],
        )
        .unwrap()
        .with_tags(["anime".to_string(), "base".to_string()])
        .with_creator("alice")
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            ProvenanceWriter::sidecar_path(
                Path::new("/models/checkpoints/my-model.safetensors"),
                SourceKind::Civitai
            ),
            PathBuf::from("/models/checkpoints/my-model.safetensors.civitai.json")
        );
        assert_eq!(
            ProvenanceWriter::sidecar_path(Path::new("repo/model.gguf"), SourceKind::HuggingFace),
            PathBuf::from("repo/model.gguf.huggingface.json")
        );
    }

    #[test]
    fn test_write_then_read_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("my-model.safetensors");
        std::fs::write(&artifact, b"data").unwrap();

        let record = ProvenanceRecord::from_manifest(
            &manifest(),
            "my-model.safetensors",
            4,
            DestinationCategory::Checkpoint,
            Some("abc".to_string()),
        );

        let path = ProvenanceWriter::write(&artifact, &record).unwrap();
        assert!(path.exists());
        assert!(ProvenanceWriter::exists_for(&artifact));

        let read_back = ProvenanceWriter::read(&artifact, SourceKind::Civitai)
            .unwrap()
            .unwrap();
        assert_eq!(read_back, record);
    }

    #[test]
    fn test_write_overwrites_existing_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("a.safetensors");

        let mut record = ProvenanceRecord::from_manifest(
            &manifest(),
            "a.safetensors",
            1,
            DestinationCategory::Checkpoint,
            None,
        );
        ProvenanceWriter::write(&artifact, &record).unwrap();

        record.title = "Renamed".to_string();
        ProvenanceWriter::write(&artifact, &record).unwrap();

        let read_back = ProvenanceWriter::read(&artifact, SourceKind::Civitai)
            .unwrap()
            .unwrap();
        assert_eq!(read_back.title, "Renamed");
    }

    #[test]
    fn test_read_missing_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("none.safetensors");
        assert!(ProvenanceWriter::read(&artifact, SourceKind::HuggingFace)
            .unwrap()
            .is_none());
        assert!(!ProvenanceWriter::exists_for(&artifact));
    }

    #[test]
    fn test_sidecar_field_names() {
        let record = ProvenanceRecord::from_manifest(
            &manifest(),
            "m.safetensors",
            1,
            DestinationCategory::Lora,
            None,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["source"], "civitai");
        assert_eq!(json["resolved_ids"]["model_id"], 12345);
        assert_eq!(json["category"], "lora");
        assert!(json.get("sha256").is_none());
        assert!(json["download_timestamp"].is_string());
    }
}
