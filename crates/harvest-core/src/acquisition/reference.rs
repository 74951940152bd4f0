//! Reference parsing: raw user input to a typed [`SourceReference`].
//!
//! Accepted inputs:
//!
//! - registry URLs, tried in this order:
//!   1. `https://civitai.com/models/<id>/<slug>/versions/<vid>`
//!   2. `https://civitai.com/models/<id>[/<slug>][?modelVersionId=<vid>]`
//!   3. `https://civitai.com/api/download/models/<vid>` (no model id)
//! - hub URLs: `https://huggingface.co/<ns>/<repo>[/tree|blob|resolve/<rev>[/<path>]]`
//! - bare identifiers: `12345` (registry model id) or `<ns>/<repo>` (hub repo)
//!
//! Parsing is pure: no I/O, and the same input always yields the same output.

use crate::config::NetworkConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

static VERSION_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/models/(\d+)/[^/]+/versions/(\d+)").unwrap());
static ITEM_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/models/(\d+)(?:/[^/]*)?").unwrap());
static DOWNLOAD_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/api/download/models/(\d+)").unwrap());

static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());
static BARE_REPO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][\w.-]*/[\w.-]+$").unwrap());

/// First path segments on the hub host that are not model repositories.
const HUB_RESERVED_SEGMENTS: &[&str] = &["api", "datasets", "spaces", "docs", "settings"];

/// Remote source a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Package-registry-style source with numeric model and version ids.
    Civitai,
    /// Hub-style source with `namespace/repo` ids and git revisions.
    #[serde(alias = "hf", alias = "hub")]
    HuggingFace,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Civitai, SourceKind::HuggingFace];

    /// Stable lowercase name, also used as the provenance sidecar suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Civitai => "civitai",
            SourceKind::HuggingFace => "huggingface",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "civitai" => Some(SourceKind::Civitai),
            "huggingface" | "hf" | "hub" => Some(SourceKind::HuggingFace),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secondary identifier: a registry version id or a hub repository id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryId {
    Version(u64),
    Repo(String),
}

/// A parsed, source-tagged model reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    pub source: SourceKind,
    /// Registry model id.
    pub primary_id: Option<u64>,
    pub secondary_id: Option<SecondaryId>,
    /// A single remote file the manifest is restricted to.
    pub explicit_filename: Option<String>,
    /// Hub git revision. Always set for hub references.
    pub revision: Option<String>,
    /// Hub directory the manifest is restricted to (`tree/<rev>/<dir>` URLs).
    pub path_scope: Option<String>,
}

impl SourceReference {
    pub fn civitai_model(model_id: u64) -> Self {
        Self {
            source: SourceKind::Civitai,
            primary_id: Some(model_id),
            secondary_id: None,
            explicit_filename: None,
            revision: None,
            path_scope: None,
        }
    }

    pub fn civitai_version(model_id: Option<u64>, version_id: u64) -> Self {
        Self {
            source: SourceKind::Civitai,
            primary_id: model_id,
            secondary_id: Some(SecondaryId::Version(version_id)),
            explicit_filename: None,
            revision: None,
            path_scope: None,
        }
    }

    pub fn hub_repo(repo_id: impl Into<String>) -> Self {
        Self {
            source: SourceKind::HuggingFace,
            primary_id: None,
            secondary_id: Some(SecondaryId::Repo(repo_id.into())),
            explicit_filename: None,
            revision: Some(NetworkConfig::HF_DEFAULT_REVISION.to_string()),
            path_scope: None,
        }
    }

    pub fn version_id(&self) -> Option<u64> {
        match self.secondary_id {
            Some(SecondaryId::Version(id)) => Some(id),
            _ => None,
        }
    }

    pub fn repo_id(&self) -> Option<&str> {
        match &self.secondary_id {
            Some(SecondaryId::Repo(repo)) => Some(repo),
            _ => None,
        }
    }

    /// A version-only registry reference whose model id must be looked up.
    pub fn needs_secondary_lookup(&self) -> bool {
        self.primary_id.is_none() && self.version_id().is_some()
    }

    pub fn with_explicit_filename(mut self, filename: impl Into<String>) -> Self {
        self.explicit_filename = Some(filename.into());
        self
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.primary_id, &self.secondary_id) {
            (Some(model), Some(SecondaryId::Version(version))) => {
                write!(f, "{}:{}@{}", self.source, model, version)
            }
            (Some(model), _) => write!(f, "{}:{}", self.source, model),
            (None, Some(SecondaryId::Version(version))) => {
                write!(f, "{}:?@{}", self.source, version)
            }
            (None, Some(SecondaryId::Repo(repo))) => write!(
                f,
                "{}:{}@{}",
                self.source,
                repo,
                self.revision
                    .as_deref()
                    .unwrap_or(NetworkConfig::HF_DEFAULT_REVISION)
            ),
            (None, None) => write!(f, "{}:?", self.source),
        }
    }
}

/// Why an input could not be turned into a complete reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unrecognized model reference: {0}")]
    NotRecognized(String),

    /// A download-by-version URL: the reference is valid but the model id
    /// must be derived through a catalog lookup.
    #[error("Reference names version {version_id} but no model id")]
    AmbiguousButIncomplete {
        version_id: u64,
        reference: SourceReference,
    },
}

/// Parses raw strings into [`SourceReference`]s.
///
/// # Example
///
/// ```
/// use harvest_core::acquisition::{ReferenceParser, SourceKind};
///
/// let parser = ReferenceParser::default();
/// let reference = parser
///     .parse("https://civitai.com/models/12345/my-model/versions/67890")
///     .unwrap();
///
/// assert_eq!(reference.source, SourceKind::Civitai);
/// assert_eq!(reference.primary_id, Some(12345));
/// assert_eq!(reference.version_id(), Some(67890));
/// ```
#[derive(Debug, Clone)]
pub struct ReferenceParser {
    registry_host: String,
    hub_host: String,
}

impl Default for ReferenceParser {
    fn default() -> Self {
        Self::new(NetworkConfig::CIVITAI_HOST, NetworkConfig::HF_HOST)
    }
}

impl ReferenceParser {
    /// Parser recognising URLs on the given hosts.
    pub fn new(registry_host: &str, hub_host: &str) -> Self {
        Self {
            registry_host: normalize_host(registry_host),
            hub_host: normalize_host(hub_host),
        }
    }

    pub fn parse(&self, raw: &str) -> Result<SourceReference, ParseError> {
        self.parse_with_hint(raw, None)
    }

    /// Parse with an optional source hint. The hint only disambiguates bare
    /// identifiers; a URL for a different source is rejected.
    pub fn parse_with_hint(
        &self,
        raw: &str,
        hint: Option<SourceKind>,
    ) -> Result<SourceReference, ParseError> {
        let input = raw.trim().trim_end_matches('/');
        let not_recognized = || ParseError::NotRecognized(raw.trim().to_string());
        if input.is_empty() {
            return Err(not_recognized());
        }

        if let Some(url) = parse_url(input) {
            let host = url.host_str().map(normalize_host).unwrap_or_default();
            let (source, parsed) = if host == self.registry_host {
                (SourceKind::Civitai, parse_registry_url(&url))
            } else if host == self.hub_host {
                (SourceKind::HuggingFace, parse_hub_url(&url))
            } else if input.contains("://") {
                return Err(not_recognized());
            } else {
                // Host-less bare id such as `org.name/repo`.
                return self.parse_bare(input, hint).ok_or_else(not_recognized);
            };

            if hint.is_some_and(|hint| hint != source) {
                return Err(not_recognized());
            }
            return parsed.unwrap_or_else(|| Err(not_recognized()));
        }

        self.parse_bare(input, hint).ok_or_else(not_recognized)
    }

    fn parse_bare(&self, input: &str, hint: Option<SourceKind>) -> Option<SourceReference> {
        if BARE_ID.is_match(input) && hint != Some(SourceKind::HuggingFace) {
            return input.parse().ok().map(SourceReference::civitai_model);
        }

        if BARE_REPO.is_match(input) && hint != Some(SourceKind::Civitai) {
            return Some(SourceReference::hub_repo(input));
        }

        None
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Parse `input` as a URL, accepting a missing scheme when the input
/// starts with something host-like.
fn parse_url(input: &str) -> Option<Url> {
    if input.contains("://") {
        return Url::parse(input).ok();
    }
    let (head, _) = input.split_once('/')?;
    if head.contains('.') {
        Url::parse(&format!("https://{}", input)).ok()
    } else {
        None
    }
}

fn parse_registry_url(url: &Url) -> Option<Result<SourceReference, ParseError>> {
    let path = url.path();

    if let Some(caps) = VERSION_PATH.captures(path) {
        let model_id = caps[1].parse().ok()?;
        let version_id = caps[2].parse().ok()?;
        return Some(Ok(SourceReference::civitai_version(
            Some(model_id),
            version_id,
        )));
    }

    if let Some(caps) = ITEM_PATH.captures(path) {
        let model_id: u64 = caps[1].parse().ok()?;
        let version_id = url
            .query_pairs()
            .find(|(key, _)| key == "modelVersionId")
            .and_then(|(_, value)| value.parse::<u64>().ok());
        return Some(Ok(match version_id {
            Some(version_id) => SourceReference::civitai_version(Some(model_id), version_id),
            None => SourceReference::civitai_model(model_id),
        }));
    }

    if let Some(caps) = DOWNLOAD_PATH.captures(path) {
        let version_id = caps[1].parse().ok()?;
        return Some(Err(ParseError::AmbiguousButIncomplete {
            version_id,
            reference: SourceReference::civitai_version(None, version_id),
        }));
    }

    None
}

fn parse_hub_url(url: &Url) -> Option<Result<SourceReference, ParseError>> {
    let segments: Vec<String> = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
        .collect();

    let [namespace, repo, rest @ ..] = segments.as_slice() else {
        return None;
    };
    if HUB_RESERVED_SEGMENTS.contains(&namespace.as_str()) {
        return None;
    }

    let mut reference = SourceReference::hub_repo(format!("{}/{}", namespace, repo));

    match rest {
        [] => {}
        [kind, revision, path @ ..] if matches!(kind.as_str(), "tree" | "blob" | "resolve") => {
            reference.revision = Some(revision.clone());
            if !path.is_empty() {
                let path = path.join("/");
                if kind == "tree" {
                    reference.path_scope = Some(path);
                } else {
                    reference.explicit_filename = Some(path);
                }
            }
        }
        _ => return None,
    }

    Some(Ok(reference))
}
