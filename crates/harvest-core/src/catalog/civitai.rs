//! Registry-style catalog backed by the Civitai REST API.
//!
//! Endpoints used:
//! - `GET /models/{id}`: model metadata with its versions and their files
//! - `GET /model-versions/{id}`: a single version, including its `modelId`
//! - `GET /models?query=&limit=&types=`: search

use super::types::{AuthorizedRequest, RemoteFile, ResolvedIds, ResolvedManifest, SearchHit};
use super::RemoteCatalog;
use crate::acquisition::{SourceKind, SourceReference};
use crate::config::NetworkConfig;
use crate::error::{HarvestError, Result};
use crate::network::HttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const SOURCE_NAME: &str = "civitai";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CivitaiModel {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    model_type: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    creator: Option<CivitaiCreator>,
    #[serde(default)]
    stats: Option<CivitaiStats>,
    #[serde(default)]
    model_versions: Vec<CivitaiVersion>,
}

#[derive(Debug, Deserialize)]
struct CivitaiCreator {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CivitaiStats {
    #[serde(default)]
    download_count: u64,
    #[serde(default)]
    thumbs_up_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CivitaiVersion {
    id: u64,
    #[serde(default)]
    model_id: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    files: Vec<CivitaiFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CivitaiFile {
    name: String,
    #[serde(default, rename = "sizeKB")]
    size_kb: f64,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    hashes: Option<CivitaiHashes>,
    #[serde(default)]
    primary: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct CivitaiHashes {
    #[serde(default, rename = "SHA256")]
    sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CivitaiSearchResponse {
    #[serde(default)]
    items: Vec<CivitaiModel>,
}

/// Catalog for the Civitai model registry.
#[derive(Debug, Clone)]
pub struct CivitaiCatalog {
    http: HttpClient,
    api_base: String,
    web_base: String,
    token: Option<String>,
}

impl CivitaiCatalog {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new()?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            web_base: NetworkConfig::CIVITAI_WEB_BASE.to_string(),
            token,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = HttpClient::with_timeout(timeout)?;
        Ok(self)
    }

    /// Base used for the page URLs of search hits.
    pub fn with_web_base(mut self, web_base: impl Into<String>) -> Self {
        self.web_base = web_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_model(&self, model_id: u64) -> Result<CivitaiModel> {
        let url = format!("{}/models/{}", self.api_base, model_id);
        self.http
            .get_json(&url, &[], self.token.as_deref())
            .await
            .map_err(|e| not_found_on_404(e, format!("model {}", model_id)))
    }

    async fn fetch_version(&self, version_id: u64) -> Result<CivitaiVersion> {
        let url = format!("{}/model-versions/{}", self.api_base, version_id);
        self.http
            .get_json(&url, &[], self.token.as_deref())
            .await
            .map_err(|e| not_found_on_404(e, format!("version {}", version_id)))
    }
}

#[async_trait]
impl RemoteCatalog for CivitaiCatalog {
    fn source(&self) -> SourceKind {
        SourceKind::Civitai
    }

    async fn resolve(&self, reference: &SourceReference) -> Result<ResolvedManifest> {
        let model_id = reference
            .primary_id
            .ok_or_else(|| HarvestError::InvalidReference {
                input: reference.to_string(),
            })?;

        let model = self.fetch_model(model_id).await?;

        let version = match reference.version_id() {
            Some(version_id) => {
                match model.model_versions.iter().find(|v| v.id == version_id) {
                    Some(version) if !version.files.is_empty() => version.clone(),
                    _ => {
                        let version = self.fetch_version(version_id).await?;
                        if version.model_id.is_some_and(|owner| owner != model_id) {
                            return Err(HarvestError::not_found(
                                SOURCE_NAME,
                                format!("version {} of model {}", version_id, model_id),
                            ));
                        }
                        version
                    }
                }
            }
            None => model.model_versions.first().cloned().ok_or_else(|| {
                HarvestError::not_found(SOURCE_NAME, format!("versions of model {}", model_id))
            })?,
        };

        debug!(
            "Resolved {} to version {} ({})",
            reference,
            version.id,
            version.name.as_deref().unwrap_or("unnamed")
        );

        let file = select_file(&version, reference.explicit_filename.as_deref())?;
        let files = vec![to_remote_file(file, version.download_url.as_deref())?];

        let ids = ResolvedIds {
            model_id: Some(model.id),
            version_id: Some(version.id),
            ..Default::default()
        };
        let creator = model
            .creator
            .and_then(|c| c.username)
            .unwrap_or_default();

        info!("Resolved {} as '{}' ({})", reference, model.name, model.model_type);
        Ok(
            ResolvedManifest::new(SourceKind::Civitai, ids, model.name, model.model_type, files)?
                .with_tags(model.tags)
                .with_creator(creator),
        )
    }

    async fn resolve_version_owner(&self, version_id: u64) -> Result<u64> {
        let version = self
            .fetch_version(version_id)
            .await
            .map_err(|e| HarvestError::UnresolvedReference {
                version_id,
                message: e.to_string(),
            })?;

        version
            .model_id
            .ok_or_else(|| HarvestError::UnresolvedReference {
                version_id,
                message: "version carries no model id".to_string(),
            })
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        type_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let url = format!("{}/models", self.api_base);
        let mut params = vec![
            ("query", query.to_string()),
            (
                "limit",
                limit.clamp(1, NetworkConfig::CIVITAI_SEARCH_LIMIT_MAX).to_string(),
            ),
        ];
        if let Some(types) = type_filter {
            params.push(("types", types.to_string()));
        }

        let response: CivitaiSearchResponse = self
            .http
            .get_json(&url, &params, self.token.as_deref())
            .await?;

        Ok(response
            .items
            .into_iter()
            .map(|model| {
                let stats = model.stats.unwrap_or_default();
                SearchHit {
                    source: SourceKind::Civitai,
                    id: model.id.to_string(),
                    url: format!("{}/models/{}", self.web_base, model.id),
                    name: model.name,
                    type_tag: model.model_type,
                    creator: model
                        .creator
                        .and_then(|c| c.username)
                        .unwrap_or_default(),
                    downloads: stats.download_count,
                    likes: stats.thumbs_up_count,
                    tags: model.tags,
                }
            })
            .collect())
    }

    /// The registry accepts its token as a `token` query parameter on
    /// download URLs.
    fn authorize(&self, file: &RemoteFile) -> AuthorizedRequest {
        let Some(token) = self.token.as_deref() else {
            return AuthorizedRequest {
                url: file.download_url.clone(),
                bearer: None,
            };
        };

        match Url::parse(&file.download_url) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("token", token);
                AuthorizedRequest {
                    url: url.into(),
                    bearer: None,
                }
            }
            Err(_) => AuthorizedRequest {
                url: file.download_url.clone(),
                bearer: Some(token.to_string()),
            },
        }
    }
}

/// The version's primary file, or the one named `explicit`.
fn select_file<'a>(version: &'a CivitaiVersion, explicit: Option<&str>) -> Result<&'a CivitaiFile> {
    if let Some(name) = explicit {
        return version.files.iter().find(|f| f.name == name).ok_or_else(|| {
            HarvestError::not_found(
                SOURCE_NAME,
                format!("file '{}' in version {}", name, version.id),
            )
        });
    }

    version
        .files
        .iter()
        .find(|f| f.primary == Some(true))
        .or_else(|| version.files.first())
        .ok_or_else(|| {
            HarvestError::not_found(SOURCE_NAME, format!("files of version {}", version.id))
        })
}

fn to_remote_file(file: &CivitaiFile, version_url: Option<&str>) -> Result<RemoteFile> {
    let url = file
        .download_url
        .as_deref()
        .or(version_url)
        .ok_or_else(|| {
            HarvestError::not_found(SOURCE_NAME, format!("download URL for {}", file.name))
        })?;

    let size_bytes = (file.size_kb.max(0.0) * 1024.0).round() as u64;
    let remote = RemoteFile::new(file.name.clone(), size_bytes, url);
    Ok(match file.hashes.as_ref().and_then(|h| h.sha256.as_deref()) {
        Some(sha256) => remote.with_sha256(sha256),
        None => remote,
    })
}

fn not_found_on_404(err: HarvestError, what: String) -> HarvestError {
    match err {
        HarvestError::Network {
            status: Some(404), ..
        } => HarvestError::not_found(SOURCE_NAME, what),
        other => other,
    }
}
