//! Remote catalogs: metadata lookup for each supported source.
//!
//! Each source implements [`RemoteCatalog`]. The engine is handed a
//! [`CatalogSet`] holding exactly the catalogs enabled at startup and asks it
//! for the one matching a parsed reference.

mod auth;
pub mod civitai;
pub mod hub;
mod types;

pub use auth::{
    hf_cache_token_path, resolve_civitai_token, resolve_hub_token, CatalogTokens, TokenSource,
    CIVITAI_TOKEN_ENV_VAR, HF_TOKEN_ENV_VAR,
};
pub use civitai::CivitaiCatalog;
pub use hub::HubCatalog;
pub use types::{AuthorizedRequest, RemoteFile, ResolvedIds, ResolvedManifest, SearchHit};

use crate::acquisition::{SourceKind, SourceReference};
use crate::config::Settings;
use crate::error::{HarvestError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Metadata lookup against one remote source.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    fn source(&self) -> SourceKind;

    /// Resolve a complete reference into a manifest with at least one file.
    async fn resolve(&self, reference: &SourceReference) -> Result<ResolvedManifest>;

    /// Find the model id owning `version_id`.
    ///
    /// Sources without version ids fail with `UnresolvedReference`.
    async fn resolve_version_owner(&self, version_id: u64) -> Result<u64> {
        Err(HarvestError::UnresolvedReference {
            version_id,
            message: format!("{} has no version ids", self.source()),
        })
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        type_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>>;

    /// URL and credentials to download `file` with.
    fn authorize(&self, file: &RemoteFile) -> AuthorizedRequest {
        AuthorizedRequest {
            url: file.download_url.clone(),
            bearer: None,
        }
    }
}

/// The catalogs enabled for this process, keyed by source.
#[derive(Clone, Default)]
pub struct CatalogSet {
    catalogs: BTreeMap<SourceKind, Arc<dyn RemoteCatalog>>,
}

impl CatalogSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both built-in catalogs configured from `settings`.
    pub fn from_settings(settings: &Settings, tokens: CatalogTokens) -> Result<Self> {
        let civitai = CivitaiCatalog::new(settings.civitai_api_base.clone(), tokens.civitai)?
            .with_timeout(settings.request_timeout())?;
        let hub = HubCatalog::new(
            settings.hub_api_base.clone(),
            settings.hub_download_base.clone(),
            tokens.hub,
        )?
        .with_timeout(settings.request_timeout())?;

        Ok(Self::new().with(Arc::new(civitai)).with(Arc::new(hub)))
    }

    /// Add or replace the catalog for its source.
    pub fn with(mut self, catalog: Arc<dyn RemoteCatalog>) -> Self {
        self.insert(catalog);
        self
    }

    pub fn insert(&mut self, catalog: Arc<dyn RemoteCatalog>) {
        self.catalogs.insert(catalog.source(), catalog);
    }

    pub fn get(&self, source: SourceKind) -> Result<&Arc<dyn RemoteCatalog>> {
        self.catalogs
            .get(&source)
            .ok_or_else(|| HarvestError::SourceUnavailable(source.to_string()))
    }

    pub fn sources(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.catalogs.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }
}

impl std::fmt::Debug for CatalogSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogSet")
            .field("sources", &self.catalogs.keys().collect::<Vec<_>>())
            .finish()
    }
}
