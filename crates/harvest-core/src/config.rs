//! Centralized configuration for Harvest.
//!
//! Constant tables live on unit structs; user-tunable values live in
//! [`Settings`], which can be loaded from a JSON file.

use crate::acquisition::DestinationCategory;
use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const USER_AGENT: &'static str = "harvest/0.3";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const DOWNLOAD_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
    pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 1;
    pub const CIVITAI_HOST: &'static str = "civitai.com";
    pub const CIVITAI_API_BASE: &'static str = "https://civitai.com/api/v1";
    pub const CIVITAI_WEB_BASE: &'static str = "https://civitai.com";
    pub const CIVITAI_SEARCH_LIMIT_MAX: usize = 100;
    pub const HF_HOST: &'static str = "huggingface.co";
    pub const HF_API_BASE: &'static str = "https://huggingface.co/api";
    pub const HF_HUB_BASE: &'static str = "https://huggingface.co";
    pub const HF_DEFAULT_REVISION: &'static str = "main";
}

/// Shared directory and path configurations.
pub struct PathsConfig;

impl PathsConfig {
    pub const MODELS_DIR_NAME: &'static str = "models";
    pub const SIDECAR_EXTENSION: &'static str = "json";
    pub const SETTINGS_FILENAME: &'static str = "harvest.json";

    /// Extensions of weight files, without the leading dot.
    pub const MODEL_EXTENSIONS: &'static [&'static str] = &[
        "safetensors", "ckpt", "pt", "pt2", "pth", "bin", "pkl", "sft", "gguf",
    ];

    /// Config files that travel with weights in hub repositories.
    pub const AUXILIARY_EXTENSIONS: &'static [&'static str] = &["json", "yaml"];
}

/// User-tunable settings, loaded from an optional JSON file.
///
/// Every field has a default so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Upper bound on files transferred at once within one request.
    /// `1` keeps the sequential behaviour.
    pub max_concurrent_downloads: usize,
    /// Extra attempts per file after a retryable failure. `0` disables retries.
    pub max_retries: u32,
    /// Verify downloads against hashes published by the remote when the
    /// caller did not supply one.
    pub verify_remote_hashes: bool,
    /// Timeout for catalog API calls, in seconds.
    pub request_timeout_secs: u64,
    /// Root holding one directory per category.
    pub models_dir: Option<PathBuf>,
    /// Per-category directory overrides, keyed by category name.
    pub category_dirs: HashMap<String, PathBuf>,
    pub civitai_api_base: String,
    pub hub_api_base: String,
    pub hub_download_base: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: NetworkConfig::DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            max_retries: 0,
            verify_remote_hashes: true,
            request_timeout_secs: NetworkConfig::REQUEST_TIMEOUT.as_secs(),
            models_dir: None,
            category_dirs: HashMap::new(),
            civitai_api_base: NetworkConfig::CIVITAI_API_BASE.to_string(),
            hub_api_base: NetworkConfig::HF_API_BASE.to_string(),
            hub_download_base: NetworkConfig::HF_HUB_BASE.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| HarvestError::io_with_path(e, path))?;
        let settings: Settings =
            serde_json::from_str(&contents).map_err(|e| HarvestError::Config {
                message: format!("Invalid settings file {}: {}", path.display(), e),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from `path` if given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0 {
            return Err(HarvestError::Config {
                message: "max_concurrent_downloads must be at least 1".to_string(),
            });
        }
        for name in self.category_dirs.keys() {
            if DestinationCategory::from_name(name).is_none() {
                return Err(HarvestError::Config {
                    message: format!("Unknown category in category_dirs: {}", name),
                });
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
