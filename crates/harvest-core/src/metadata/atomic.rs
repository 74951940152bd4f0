//! Atomic JSON persistence for sidecar files.
//!
//! Writes go to a temp file with a PID+TID suffix, are synced to disk, then
//! renamed over the target so a reader never sees a half-written sidecar.

use crate::error::{HarvestError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process;
use std::thread;
use tracing::debug;

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|e| HarvestError::io_with_path(e, path))?;

    let data: T = serde_json::from_str(&contents).map_err(|e| HarvestError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Write data to a JSON file atomically, replacing any existing file.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| HarvestError::io_with_path(e, parent))?;
        }
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(
        "{}.{}.{}.tmp",
        file_name,
        process::id(),
        thread_id()
    ));

    let serialized = serde_json::to_string_pretty(data).map_err(|e| HarvestError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| HarvestError::io_with_path(e, &temp_path))?;

        file.write_all(serialized.as_bytes())
            .map_err(|e| HarvestError::io_with_path(e, &temp_path))?;
        file.sync_all()
            .map_err(|e| HarvestError::io_with_path(e, &temp_path))?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(HarvestError::io_with_path(e, path));
    }

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    format!("{:?}", thread::current().id()).hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sidecar {
        name: String,
        size: u64,
    }

    #[test]
    fn test_atomic_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.safetensors.civitai.json");

        let data = Sidecar {
            name: "model".to_string(),
            size: 42,
        };

        atomic_write_json(&path, &data).unwrap();
        assert!(path.exists());

        let read_back: Option<Sidecar> = atomic_read_json(&path).unwrap();
        assert_eq!(read_back, Some(data));
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.json");

        atomic_write_json(&path, &Sidecar { name: "first".into(), size: 1 }).unwrap();
        atomic_write_json(&path, &Sidecar { name: "second".into(), size: 2 }).unwrap();

        let read_back: Option<Sidecar> = atomic_read_json(&path).unwrap();
        assert_eq!(read_back.unwrap().name, "second");

        // No temp files left behind
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_atomic_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let result: Option<Sidecar> =
            atomic_read_json(&temp_dir.path().join("missing.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_atomic_read_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let result: Result<Option<Sidecar>> = atomic_read_json(&path);
        assert!(matches!(result, Err(HarvestError::Json { .. })));
    }

    #[test]
    fn test_atomic_write_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("x.json");

        atomic_write_json(&path, &Sidecar { name: "n".into(), size: 0 }).unwrap();
        assert!(path.exists());
    }
}
