//! Category to filesystem root lookup.
//!
//! The engine consumes this as a pure function. A resolver that has no root
//! for a category answers `UnknownCategory` and the engine refuses to guess.

use super::category::DestinationCategory;
use crate::config::{PathsConfig, Settings};
use crate::error::{HarvestError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Maps a destination category to the directory holding its files.
pub trait DirectoryResolver: Send + Sync {
    fn root_for(&self, category: DestinationCategory) -> Result<PathBuf>;
}

/// Static category roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelDirectories {
    roots: BTreeMap<DestinationCategory, PathBuf>,
}

impl ModelDirectories {
    /// An empty mapping; every lookup fails until roots are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// One subdirectory per category below `base`, using the conventional
    /// names (`checkpoints`, `loras`, `vae`, ...).
    pub fn standard_layout(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            roots: DestinationCategory::ALL
                .iter()
                .map(|category| (*category, base.join(category.dir_name())))
                .collect(),
        }
    }

    /// Standard layout below `base` (or the settings' `models_dir`, or
    /// `./models`), then per-category overrides from the settings.
    pub fn from_settings(settings: &Settings, base: Option<&Path>) -> Result<Self> {
        let base = base
            .map(Path::to_path_buf)
            .or_else(|| settings.models_dir.clone())
            .unwrap_or_else(|| PathBuf::from(PathsConfig::MODELS_DIR_NAME));

        let mut directories = Self::standard_layout(&base);
        for (name, path) in &settings.category_dirs {
            let category =
                DestinationCategory::from_name(name).ok_or_else(|| HarvestError::Config {
                    message: format!("Unknown category in category_dirs: {}", name),
                })?;
            directories.roots.insert(category, path.clone());
        }
        Ok(directories)
    }

    pub fn with_root(mut self, category: DestinationCategory, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(category, root.into());
        self
    }

    pub fn roots(&self) -> impl Iterator<Item = (DestinationCategory, &Path)> {
        self.roots.iter().map(|(category, path)| (*category, path.as_path()))
    }
}

impl DirectoryResolver for ModelDirectories {
    fn root_for(&self, category: DestinationCategory) -> Result<PathBuf> {
        self.roots
            .get(&category)
            .cloned()
            .ok_or_else(|| HarvestError::UnknownCategory(category.as_str().to_string()))
    }
}
