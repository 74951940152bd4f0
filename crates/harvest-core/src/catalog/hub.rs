//! Hub-style catalog backed by the HuggingFace model API.
//!
//! A manifest is built from the repository info (`GET /models/{repo}`) and
//! its recursive file tree at the requested revision
//! (`GET /models/{repo}/tree/{rev}[/{dir}]?recursive=true`). Only weight and
//! config files are kept; downloads go through `/{repo}/resolve/{rev}/{path}`.

use super::types::{AuthorizedRequest, RemoteFile, ResolvedIds, ResolvedManifest, SearchHit};
use super::RemoteCatalog;
use crate::acquisition::{CategoryClassifier, SourceKind, SourceReference};
use crate::config::{NetworkConfig, PathsConfig};
use crate::error::{HarvestError, Result};
use crate::network::HttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const SOURCE_NAME: &str = "huggingface";

/// Repository info from `/api/models/{repo}`.
#[derive(Debug, Deserialize)]
struct HubModelInfo {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "modelId")]
    model_id: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    pipeline_tag: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    downloads: Option<u64>,
    #[serde(default)]
    likes: Option<u64>,
}

/// File entry from the tree API.
#[derive(Debug, Deserialize)]
struct HubTreeEntry {
    path: String,
    #[serde(default, rename = "type")]
    entry_type: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    lfs: Option<HubLfsInfo>,
}

#[derive(Debug, Deserialize)]
struct HubLfsInfo {
    oid: String,
    size: u64,
}

/// Catalog for HuggingFace model repositories.
#[derive(Debug, Clone)]
pub struct HubCatalog {
    http: HttpClient,
    api_base: String,
    download_base: String,
    token: Option<String>,
}

impl HubCatalog {
    pub fn new(
        api_base: impl Into<String>,
        download_base: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new()?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            download_base: download_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = HttpClient::with_timeout(timeout)?;
        Ok(self)
    }

    fn resolve_url(&self, repo_id: &str, revision: &str, path: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.download_base,
            repo_id,
            urlencoding::encode(revision),
            encode_path(path)
        )
    }

    async fn fetch_tree(
        &self,
        repo_id: &str,
        revision: &str,
        scope: Option<&str>,
    ) -> Result<Vec<HubTreeEntry>> {
        let mut url = format!(
            "{}/models/{}/tree/{}",
            self.api_base,
            repo_id,
            urlencoding::encode(revision)
        );
        if let Some(dir) = scope {
            url.push('/');
            url.push_str(&encode_path(dir));
        }

        self.http
            .get_json(&url, &[("recursive", "true".to_string())], self.token.as_deref())
            .await
            .map_err(|e| not_found_on_404(e, format!("{}@{}", repo_id, revision)))
    }
}

#[async_trait]
impl RemoteCatalog for HubCatalog {
    fn source(&self) -> SourceKind {
        SourceKind::HuggingFace
    }

    async fn resolve(&self, reference: &SourceReference) -> Result<ResolvedManifest> {
        let repo_id = reference
            .repo_id()
            .ok_or_else(|| HarvestError::InvalidReference {
                input: reference.to_string(),
            })?;
        let revision = reference
            .revision
            .as_deref()
            .unwrap_or(NetworkConfig::HF_DEFAULT_REVISION);

        let info_url = format!("{}/models/{}", self.api_base, repo_id);
        let info: HubModelInfo = self
            .http
            .get_json(&info_url, &[], self.token.as_deref())
            .await
            .map_err(|e| not_found_on_404(e, format!("repository {}", repo_id)))?;

        let entries = self
            .fetch_tree(repo_id, revision, reference.path_scope.as_deref())
            .await?;
        debug!("{}@{} lists {} tree entries", repo_id, revision, entries.len());

        let files: Vec<RemoteFile> = entries
            .into_iter()
            .filter(|entry| entry.entry_type.as_deref().unwrap_or("file") == "file")
            .filter(|entry| match reference.explicit_filename.as_deref() {
                Some(name) => entry.path == name,
                None => is_supported_file(&entry.path),
            })
            .map(|entry| {
                let url = self.resolve_url(repo_id, revision, &entry.path);
                match entry.lfs {
                    Some(lfs) => RemoteFile::new(entry.path, lfs.size, url).with_sha256(lfs.oid),
                    None => RemoteFile::new(entry.path, entry.size.unwrap_or(0), url),
                }
            })
            .collect();

        let ids = ResolvedIds {
            repo_id: Some(repo_id.to_string()),
            revision: Some(revision.to_string()),
            ..Default::default()
        };
        let creator = info
            .author
            .or_else(|| repo_id.split('/').next().map(str::to_string))
            .unwrap_or_default();
        let title = info
            .id
            .or(info.model_id)
            .unwrap_or_else(|| repo_id.to_string());
        let type_tag = match CategoryClassifier::infer_repo_type_tag(repo_id, &info.tags) {
            Some(tag) => tag.to_string(),
            None => info.pipeline_tag.unwrap_or_default(),
        };

        info!("Resolved {} with {} files", reference, files.len());
        Ok(ResolvedManifest::new(
            SourceKind::HuggingFace,
            ids,
            title,
            type_tag,
            files,
        )?
        .with_tags(info.tags)
        .with_creator(creator))
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        type_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let url = format!("{}/models", self.api_base);
        let mut params = vec![
            ("search", query.to_string()),
            ("limit", limit.max(1).to_string()),
            ("sort", "downloads".to_string()),
            ("direction", "-1".to_string()),
        ];
        if let Some(pipeline_tag) = type_filter {
            params.push(("pipeline_tag", pipeline_tag.to_string()));
        }

        let results: Vec<HubModelInfo> = self
            .http
            .get_json(&url, &params, self.token.as_deref())
            .await?;

        Ok(results
            .into_iter()
            .filter_map(|info| {
                let id = info.id.or(info.model_id)?;
                let creator = info
                    .author
                    .or_else(|| id.split('/').next().map(str::to_string))
                    .unwrap_or_default();
                Some(SearchHit {
                    source: SourceKind::HuggingFace,
                    url: format!("{}/{}", self.download_base, id),
                    name: id.rsplit('/').next().unwrap_or(&id).to_string(),
                    id,
                    type_tag: info.pipeline_tag.unwrap_or_default(),
                    creator,
                    downloads: info.downloads.unwrap_or(0),
                    likes: info.likes.unwrap_or(0),
                    tags: info.tags,
                })
            })
            .collect())
    }

    fn authorize(&self, file: &RemoteFile) -> AuthorizedRequest {
        AuthorizedRequest {
            url: file.download_url.clone(),
            bearer: self.token.clone(),
        }
    }
}

/// Weight or config file by extension.
pub fn is_supported_file(path: &str) -> bool {
    let Some((_, ext)) = path.rsplit_once('.') else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    PathsConfig::MODEL_EXTENSIONS.contains(&ext.as_str())
        || PathsConfig::AUXILIARY_EXTENSIONS.contains(&ext.as_str())
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn not_found_on_404(err: HarvestError, what: String) -> HarvestError {
    match err {
        HarvestError::Network {
            status: Some(404), ..
        } => HarvestError::not_found(SOURCE_NAME, what),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_files() {
        assert!(is_supported_file("model.safetensors"));
        assert!(is_supported_file("unet/diffusion_pytorch_model.fp16.safetensors"));
        assert!(is_supported_file("model_index.json"));
        assert!(is_supported_file("llama-7b.Q4_K_M.GGUF"));
        assert!(!is_supported_file("README.md"));
        assert!(!is_supported_file(".gitattributes"));
        assert!(!is_supported_file("LICENSE"));
    }

    #[test]
    fn test_resolve_url_encodes_segments() {
        let catalog = HubCatalog::new(
            "https://huggingface.co/api",
            "https://huggingface.co/",
            None,
        )
        .unwrap();
        assert_eq!(
            catalog.resolve_url("org/repo", "main", "sub dir/model.safetensors"),
            "https://huggingface.co/org/repo/resolve/main/sub%20dir/model.safetensors"
        );
        assert_eq!(
            catalog.resolve_url("org/repo", "refs/pr/1", "a.bin"),
            "https://huggingface.co/org/repo/resolve/refs%2Fpr%2F1/a.bin"
        );
    }

    #[test]
    fn test_deserialize_tree_entries() {
        let entries: Vec<HubTreeEntry> = serde_json::from_value(serde_json::json!([
            { "type": "directory", "path": "unet", "oid": "x", "size": 0 },
            {
                "type": "file",
                "path": "unet/model.safetensors",
                "size": 1024,
                "lfs": { "oid": "abc", "size": 1024, "pointerSize": 130 }
            },
            { "type": "file", "path": "model_index.json", "size": 500 }
        ]))
        .unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].lfs.as_ref().unwrap().oid, "abc");
        assert_eq!(entries[2].size, Some(500));
    }

    #[test]
    fn test_deserialize_model_info() {
        let info: HubModelInfo = serde_json::from_value(serde_json::json!({
            "id": "org/repo",
            "author": "org",
            "pipeline_tag": "text-to-image",
            "tags": ["diffusers"],
            "downloads": 5,
        }))
        .unwrap();
        assert_eq!(info.pipeline_tag.as_deref(), Some("text-to-image"));
        assert_eq!(info.likes, None);
    }

    #[test]
    fn test_deserialize_info_with_both_id_keys() {
        let info: HubModelInfo = serde_json::from_value(serde_json::json!({
            "_id": "65f0c0ffee",
            "id": "stabilityai/sdxl",
            "modelId": "stabilityai/sdxl",
            "author": "stabilityai",
            "pipeline_tag": "text-to-image",
            "tags": ["diffusers"],
            "downloads": 100,
            "likes": 3
        }))
        .unwrap();
        assert_eq!(info.id.as_deref(), Some("stabilityai/sdxl"));
        assert_eq!(info.model_id.as_deref(), Some("stabilityai/sdxl"));

        let legacy: HubModelInfo =
            serde_json::from_value(serde_json::json!({ "modelId": "org/old" })).unwrap();
        assert_eq!(legacy.id.or(legacy.model_id).as_deref(), Some("org/old"));
    }

    #[test]
    fn test_authorize_uses_bearer() {
        let catalog =
            HubCatalog::new("https://h/api", "https://h", Some("hf_token".into())).unwrap();
        let file = RemoteFile::new("a.bin", 1, "https://h/org/repo/resolve/main/a.bin");
        let request = catalog.authorize(&file);
        assert_eq!(request.url, file.download_url);
        assert_eq!(request.bearer.as_deref(), Some("hf_token"));
    }
}
