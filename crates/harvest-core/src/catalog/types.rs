//! Source-independent catalog data.

use crate::acquisition::SourceKind;
use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One downloadable file of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Remote name, relative to the repository root for hub files. Never
    /// rewritten before classification.
    pub name: String,
    pub size_bytes: u64,
    pub download_url: String,
    /// Lowercase hex SHA-256 published by the remote, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl RemoteFile {
    pub fn new(name: impl Into<String>, size_bytes: u64, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            download_url: download_url.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into().to_ascii_lowercase());
        self
    }

    /// Last path component of [`Self::name`].
    pub fn basename(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Identifiers the catalog resolved a reference to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIds {
    pub model_id: Option<u64>,
    pub version_id: Option<u64>,
    pub repo_id: Option<String>,
    pub revision: Option<String>,
}

/// Resolved description of a model version's downloadable files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedManifest {
    pub source: SourceKind,
    pub ids: ResolvedIds,
    pub title: String,
    /// Source-declared type, empty when the source declares none.
    pub type_tag: String,
    /// Never empty; see [`ResolvedManifest::new`].
    pub files: Vec<RemoteFile>,
    pub tags: BTreeSet<String>,
    pub creator: String,
}

impl ResolvedManifest {
    /// Build a manifest, rejecting an empty file list as `NotFound`.
    pub fn new(
        source: SourceKind,
        ids: ResolvedIds,
        title: impl Into<String>,
        type_tag: impl Into<String>,
        files: Vec<RemoteFile>,
    ) -> Result<Self> {
        let title = title.into();
        if files.is_empty() {
            return Err(HarvestError::not_found(
                source.as_str(),
                format!("downloadable files for {}", title),
            ));
        }

        Ok(Self {
            source,
            ids,
            title,
            type_tag: type_tag.into(),
            files,
            tags: BTreeSet::new(),
            creator: String::new(),
        })
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// Subdirectory hub files are placed in below their category root: the
    /// repository name without its namespace.
    pub fn repo_subdirectory(&self) -> Option<&str> {
        self.ids
            .repo_id
            .as_deref()
            .map(|repo| repo.rsplit('/').next().unwrap_or(repo))
            .filter(|name| !name.is_empty())
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub source: SourceKind,
    /// Numeric model id or `namespace/repo`.
    pub id: String,
    pub name: String,
    pub type_tag: String,
    pub creator: String,
    pub downloads: u64,
    pub likes: u64,
    pub tags: Vec<String>,
    pub url: String,
}

/// Download URL plus credentials for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedRequest {
    pub url: String,
    pub bearer: Option<String>,
}
