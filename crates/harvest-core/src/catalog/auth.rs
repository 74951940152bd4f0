//! Access token resolution for the remote sources.
//!
//! Registry tokens come from an explicit value or `CIVITAI_API_KEY`. Hub
//! tokens come from an explicit value, `HF_TOKEN`, or the hub CLI's cached
//! token at `~/.cache/huggingface/token`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Registry environment variable for API keys.
pub const CIVITAI_TOKEN_ENV_VAR: &str = "CIVITAI_API_KEY";

/// Hub environment variable for access tokens.
pub const HF_TOKEN_ENV_VAR: &str = "HF_TOKEN";

/// Where a token was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    Explicit,
    EnvVar,
    HfCache,
}

/// Resolved credentials for every catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogTokens {
    pub civitai: Option<String>,
    pub hub: Option<String>,
}

impl CatalogTokens {
    /// Resolve both tokens, explicit values first.
    pub fn resolve(civitai: Option<&str>, hub: Option<&str>) -> Self {
        Self {
            civitai: resolve_civitai_token(civitai).map(|(token, _)| token),
            hub: resolve_hub_token(hub).map(|(token, _)| token),
        }
    }
}

pub fn resolve_civitai_token(explicit: Option<&str>) -> Option<(String, TokenSource)> {
    non_empty(explicit)
        .map(|token| (token, TokenSource::Explicit))
        .or_else(|| env_token(CIVITAI_TOKEN_ENV_VAR).map(|token| (token, TokenSource::EnvVar)))
}

pub fn resolve_hub_token(explicit: Option<&str>) -> Option<(String, TokenSource)> {
    non_empty(explicit)
        .map(|token| (token, TokenSource::Explicit))
        .or_else(|| env_token(HF_TOKEN_ENV_VAR).map(|token| (token, TokenSource::EnvVar)))
        .or_else(|| {
            hf_cache_token_path()
                .and_then(|path| read_token_file(&path))
                .map(|token| (token, TokenSource::HfCache))
        })
}

/// Token file written by the hub CLI.
pub fn hf_cache_token_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".cache").join("huggingface").join("token"))
}

fn read_token_file(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| non_empty(Some(&content)))
}

fn env_token(var: &str) -> Option<String> {
    std::env::var(var).ok().and_then(|v| non_empty(Some(&v)))
}

fn non_empty(token: Option<&str>) -> Option<String> {
    token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
