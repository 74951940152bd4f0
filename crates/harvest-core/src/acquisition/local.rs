//! Listing of models already present in the local category directories.

use super::category::DestinationCategory;
use super::directories::ModelDirectories;
use super::provenance::ProvenanceWriter;
use crate::config::{NetworkConfig, PathsConfig};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;
use walkdir::WalkDir;

/// A model weight file found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalModel {
    pub category: DestinationCategory,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// A provenance sidecar exists next to the file.
    pub has_provenance: bool,
}

/// Walk every category root (or just `category`) for model files.
///
/// Partial downloads and sidecars are skipped. Missing roots are treated as
/// empty. Results are sorted by category, then path.
pub fn list_local_models(
    directories: &ModelDirectories,
    category: Option<DestinationCategory>,
) -> Vec<LocalModel> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut models = Vec::new();

    for (root_category, root) in directories.roots() {
        if category.is_some_and(|c| c != root_category) {
            continue;
        }
        if !root.is_dir() {
            debug!("Skipping missing {} directory {}", root_category, root.display());
            continue;
        }

        for entry in WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() || !is_model_file(&entry.file_name().to_string_lossy())
            {
                continue;
            }
            let path = entry.path().to_path_buf();
            if !seen.insert(path.clone()) {
                continue;
            }

            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            models.push(LocalModel {
                category: root_category,
                has_provenance: ProvenanceWriter::exists_for(&path),
                path,
                size_bytes,
            });
        }
    }

    models.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.path.cmp(&b.path)));
    models
}

fn is_model_file(filename: &str) -> bool {
    if filename.ends_with(NetworkConfig::DOWNLOAD_TEMP_SUFFIX) {
        return false;
    }
    let Some((_, ext)) = filename.rsplit_once('.') else {
        return false;
    };
    PathsConfig::MODEL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_lists_model_files_per_category() {
        let temp_dir = TempDir::new().unwrap();
        let dirs = ModelDirectories::standard_layout(temp_dir.path());

        let loras = temp_dir.path().join("loras");
        fs::create_dir_all(loras.join("nested")).unwrap();
        fs::write(loras.join("detail.safetensors"), b"1234").unwrap();
        fs::write(loras.join("detail.safetensors.civitai.json"), b"{}").unwrap();
        fs::write(loras.join("nested/other.pt"), b"12").unwrap();
        fs::write(loras.join("half.safetensors.part"), b"1").unwrap();
        fs::write(loras.join("readme.txt"), b"x").unwrap();

        let ckpts = temp_dir.path().join("checkpoints");
        fs::create_dir_all(&ckpts).unwrap();
        fs::write(ckpts.join("base.ckpt"), b"123").unwrap();

        let all = list_local_models(&dirs, None);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].category, DestinationCategory::Checkpoint);

        let only_loras = list_local_models(&dirs, Some(DestinationCategory::Lora));
        assert_eq!(only_loras.len(), 2);
        let detail = only_loras
            .iter()
            .find(|m| m.path.ends_with("detail.safetensors"))
            .unwrap();
        assert!(detail.has_provenance);
        assert_eq!(detail.size_bytes, 4);
        assert!(!only_loras.iter().any(|m| m.path.ends_with("other.pt") && m.has_provenance));
    }

    #[test]
    fn test_missing_roots_are_empty() {
        let temp_dir = TempDir::new().unwrap();
        let dirs = ModelDirectories::standard_layout(temp_dir.path().join("absent"));
        assert!(list_local_models(&dirs, None).is_empty());
    }
}
