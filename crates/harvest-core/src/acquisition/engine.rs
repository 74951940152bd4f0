//! Acquisition engine: parse, resolve, classify, download, verify, record.
//!
//! One call to [`AcquisitionEngine::acquire`] handles one request:
//!
//! ```text
//! Start -> Parsed -> Resolved -> Classified -> {Segmented|Direct}Download -> Verified -> Done
//! ```
//!
//! Anything failing before the first transfer aborts the request with a
//! [`HarvestError`]. After that, failures are per file: they land in the
//! outcome and never abort siblings. Members of a segment group fail
//! together: the first member failure cancels the group's in-flight
//! transfers and the remaining members are never started.
//!
//! Transfers run on a bounded pool (`max_concurrent_downloads`, default 1
//! for strictly sequential behaviour). Results flow back to the single loop
//! in [`AcquisitionEngine::acquire`], which is the only writer of the
//! result table.

use super::category::{has_weight_extension, is_main_model_file, CategoryClassifier, DestinationCategory};
use super::directories::{DirectoryResolver, ModelDirectories};
use super::outcome::{AcquisitionOutcome, FileFailure, FileOutcome, FileStatus, GroupOutcome};
use super::provenance::{ProvenanceRecord, ProvenanceWriter};
use super::reference::{ParseError, ReferenceParser, SourceKind, SourceReference};
use super::segments::{self, SegmentGroup, SegmentValidation};
use crate::cancel::CancellationToken;
use crate::catalog::{CatalogSet, RemoteCatalog, RemoteFile, ResolvedManifest, SearchHit};
use crate::config::{NetworkConfig, Settings};
use crate::error::{HarvestError, Result};
use crate::network::{
    DownloadError, DownloadProgress, DownloadReport, Downloader, ProgressCallback, RetryConfig,
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Per-file progress callback: remote file name plus transfer progress.
pub type FileProgressCallback = Arc<dyn Fn(&str, &DownloadProgress) + Send + Sync>;

/// Caller-controlled knobs for one request.
#[derive(Clone, Default)]
pub struct AcquireOptions {
    /// Directory replacing every category root.
    pub destination_override: Option<PathBuf>,
    /// Category applied to every file instead of classification.
    pub category_override: Option<DestinationCategory>,
    /// Local file name for the primary file.
    pub filename_override: Option<String>,
    /// Source used to disambiguate bare identifiers.
    pub source_hint: Option<SourceKind>,
    /// Restrict the manifest to one remote file.
    pub remote_file: Option<String>,
    /// Expected SHA-256 for the primary file.
    pub expected_hash: Option<String>,
    /// Expected SHA-256 per remote file name.
    pub expected_hashes: HashMap<String, String>,
    pub on_progress: Option<FileProgressCallback>,
    /// Cancels the whole request.
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for AcquireOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquireOptions")
            .field("destination_override", &self.destination_override)
            .field("category_override", &self.category_override)
            .field("filename_override", &self.filename_override)
            .field("source_hint", &self.source_hint)
            .field("remote_file", &self.remote_file)
            .field("expected_hash", &self.expected_hash)
            .field("expected_hashes", &self.expected_hashes)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// One manifest file after classification.
#[derive(Debug, Clone)]
struct PlannedFile {
    file: RemoteFile,
    category: DestinationCategory,
    destination: PathBuf,
    group: Option<String>,
    expected_sha256: Option<String>,
}

/// Everything decided before the first byte moves.
struct Plan {
    files: Vec<PlannedFile>,
    groups: BTreeMap<String, PlannedGroup>,
    /// Plan indices in transfer order.
    order: Vec<usize>,
}

struct PlannedGroup {
    group: SegmentGroup,
    directory: PathBuf,
    /// Set when the group failed validation and nothing will be attempted.
    rejected: Option<FileFailure>,
}

/// Per-job result before group bookkeeping.
enum JobResult {
    Done(FileStatus),
    /// Not attempted, or interrupted, because its segment group failed.
    GroupAborted,
}

/// Drives acquisition requests against a set of catalogs.
pub struct AcquisitionEngine {
    parser: ReferenceParser,
    classifier: CategoryClassifier,
    catalogs: CatalogSet,
    directories: Arc<dyn DirectoryResolver>,
    downloader: Downloader,
    max_concurrent_downloads: usize,
    retry: Option<RetryConfig>,
    verify_remote_hashes: bool,
}

impl AcquisitionEngine {
    pub fn builder(catalogs: CatalogSet) -> EngineBuilder {
        EngineBuilder::new(catalogs)
    }

    pub fn catalogs(&self) -> &CatalogSet {
        &self.catalogs
    }

    /// Start -> Parsed. A download-only reference is returned as-is for the
    /// secondary lookup.
    pub fn parse(&self, input: &str, hint: Option<SourceKind>) -> Result<SourceReference> {
        match self.parser.parse_with_hint(input, hint) {
            Ok(reference) => Ok(reference),
            Err(ParseError::AmbiguousButIncomplete { reference, .. }) => Ok(reference),
            Err(ParseError::NotRecognized(_)) => Err(HarvestError::InvalidReference {
                input: input.trim().to_string(),
            }),
        }
    }

    /// Parsed -> Resolved, including the secondary lookup for version-only
    /// references.
    pub async fn resolve(
        &self,
        mut reference: SourceReference,
    ) -> Result<(SourceReference, ResolvedManifest)> {
        let catalog = self.catalogs.get(reference.source)?;

        if reference.needs_secondary_lookup() {
            let version_id = reference.version_id().unwrap_or_default();
            debug!("Looking up the model owning version {}", version_id);
            let model_id = catalog
                .resolve_version_owner(version_id)
                .await
                .map_err(|e| match e {
                    HarvestError::UnresolvedReference { .. } => e,
                    other => HarvestError::UnresolvedReference {
                        version_id,
                        message: other.to_string(),
                    },
                })?;
            reference.primary_id = Some(model_id);
        }

        let manifest = catalog.resolve(&reference).await?;
        if manifest.files.is_empty() {
            return Err(HarvestError::NotFound {
                source_name: reference.source.to_string(),
                what: format!("downloadable files for {}", reference),
            });
        }

        info!(
            "Resolved {} to '{}' ({} files, {} bytes, type '{}')",
            reference,
            manifest.title,
            manifest.files.len(),
            manifest.total_bytes(),
            manifest.type_tag
        );
        Ok((reference, manifest))
    }

    /// Search one source.
    pub async fn search(
        &self,
        source: SourceKind,
        query: &str,
        limit: usize,
        type_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        self.catalogs
            .get(source)?
            .search(query, limit, type_filter)
            .await
    }

    /// Acquire every file of the model `input` refers to.
    pub async fn acquire(&self, input: &str, options: AcquireOptions) -> Result<AcquisitionOutcome> {
        let mut reference = self.parse(input, options.source_hint)?;
        if let Some(name) = &options.remote_file {
            reference.explicit_filename = Some(name.clone());
        }
        debug!("Parsed '{}' as {}", input.trim(), reference);

        let (reference, manifest) = self.resolve(reference).await?;
        let catalog = self.catalogs.get(reference.source)?.clone();

        let plan = self.plan(&manifest, &options)?;
        info!(
            "Classified {} files into {} segment groups",
            plan.files.len(),
            plan.groups.len()
        );

        let results = {
            let mut results: Vec<Option<JobResult>> = plan.files.iter().map(|_| None).collect();
            let mut group_tokens: HashMap<&str, CancellationToken> = HashMap::new();
            let mut failed_groups: HashSet<String> = HashSet::new();

            for (key, planned) in &plan.groups {
                match &planned.rejected {
                    Some(failure) => {
                        warn!("Segment group {} rejected: {}", key, failure);
                        failed_groups.insert(key.clone());
                    }
                    None => {
                        group_tokens.insert(key.as_str(), options.cancel.child_token());
                    }
                }
            }

            let limit = self.max_concurrent_downloads.max(1);
            let mut queue: VecDeque<usize> = plan.order.iter().copied().collect();
            let mut in_flight = FuturesUnordered::new();

            loop {
                while in_flight.len() < limit {
                    let Some(index) = queue.pop_front() else {
                        break;
                    };
                    let planned = &plan.files[index];

                    if options.cancel.is_cancelled() {
                        results[index] = Some(JobResult::Done(FileFailure::Cancelled.into()));
                        continue;
                    }

                    let token = match planned.group.as_deref() {
                        Some(group) if failed_groups.contains(group) => {
                            results[index] = Some(JobResult::GroupAborted);
                            continue;
                        }
                        Some(group) => group_tokens
                            .get(group)
                            .cloned()
                            .unwrap_or_else(|| options.cancel.child_token()),
                        None => options.cancel.clone(),
                    };

                    in_flight.push(self.transfer(index, planned, catalog.as_ref(), &options, token));
                }

                let Some((index, result)) = in_flight.next().await else {
                    break;
                };

                let planned = &plan.files[index];
                let status = self.verify(planned, result);
                let job_result = match (&planned.group, status) {
                    (Some(group), FileStatus::Failed { failure: FileFailure::Cancelled })
                        if failed_groups.contains(group) && !options.cancel.is_cancelled() =>
                    {
                        JobResult::GroupAborted
                    }
                    (Some(group), FileStatus::Failed { failure }) => {
                        if failed_groups.insert(group.clone()) {
                            warn!(
                                "Segment {} failed ({}); abandoning group {}",
                                planned.file.name, failure, group
                            );
                            if let Some(token) = group_tokens.get(group.as_str()) {
                                token.cancel();
                            }
                        }
                        JobResult::Done(failure.into())
                    }
                    (_, status) => JobResult::Done(status),
                };
                results[index] = Some(job_result);
            }
            results
        };

        let outcome = self.finish(reference, &manifest, plan, results);
        info!(
            "Acquisition of '{}' finished: {}/{} files succeeded",
            outcome.title,
            outcome.succeeded().count(),
            outcome.files.len()
        );
        Ok(outcome)
    }

    /// Resolved -> Classified: category, destination and expected hash for
    /// every file, plus segment group validation. Fails the request when a
    /// category has no directory.
    fn plan(&self, manifest: &ResolvedManifest, options: &AcquireOptions) -> Result<Plan> {
        let detected = segments::detect(&manifest.files);
        let group_of: HashMap<&str, &str> = detected
            .iter()
            .flat_map(|(key, group)| {
                group
                    .members
                    .iter()
                    .map(move |m| (m.file.name.as_str(), key.as_str()))
            })
            .collect();

        let primary_index = manifest
            .files
            .iter()
            .position(|f| is_main_model_file(f.basename()))
            .unwrap_or(0);

        let mut roots: HashMap<DestinationCategory, PathBuf> = HashMap::new();
        let mut used: HashSet<PathBuf> = HashSet::new();
        let mut files = Vec::with_capacity(manifest.files.len());

        for (index, file) in manifest.files.iter().enumerate() {
            let category = options.category_override.unwrap_or_else(|| {
                self.classifier
                    .classify(&manifest.type_tag, &file.name)
            });

            let root = match &options.destination_override {
                Some(dir) => dir.clone(),
                None => match roots.get(&category) {
                    Some(root) => root.clone(),
                    None => {
                        let root = self.directories.root_for(category)?;
                        roots.insert(category, root.clone());
                        root
                    }
                },
            };

            let group = group_of.get(file.name.as_str()).map(|key| key.to_string());
            let mut directory = root;
            let relative_name = match (manifest.repo_subdirectory(), &group) {
                (Some(repo), _) => {
                    directory.push(repo);
                    file.name.clone()
                }
                (None, Some(key)) => {
                    directory.push(detected[key].display_name());
                    file.basename().to_string()
                }
                (None, None) => file.basename().to_string(),
            };

            let local_name = match &options.filename_override {
                Some(name) if index == primary_index && group.is_none() => name.clone(),
                _ => relative_name,
            };

            let mut destination = directory.join(&local_name);
            if !used.insert(destination.clone()) {
                destination = directory.join(&file.name);
                used.insert(destination.clone());
            }

            let expected_sha256 = options
                .expected_hashes
                .get(&file.name)
                .cloned()
                .or_else(|| {
                    (index == primary_index)
                        .then(|| options.expected_hash.clone())
                        .flatten()
                })
                .or_else(|| {
                    self.verify_remote_hashes
                        .then(|| file.sha256.clone())
                        .flatten()
                })
                .map(|h| h.trim().to_ascii_lowercase());

            debug!(
                "{} -> {} ({})",
                file.name,
                destination.display(),
                category
            );
            files.push(PlannedFile {
                file: file.clone(),
                category,
                destination,
                group,
                expected_sha256,
            });
        }

        let mut groups = BTreeMap::new();
        for (key, group) in detected {
            let rejected = match group.validate() {
                SegmentValidation::Complete => None,
                SegmentValidation::Inconsistent {
                    totals,
                    out_of_range,
                } => Some(FileFailure::InconsistentSegmentMetadata {
                    group: key.clone(),
                    totals,
                    out_of_range,
                }),
                SegmentValidation::Incomplete { missing } => Some(FileFailure::IncompleteSegments {
                    group: key.clone(),
                    missing,
                }),
            };
            let directory = files
                .iter()
                .find(|f: &&PlannedFile| f.group.as_deref() == Some(key.as_str()))
                .and_then(|f| f.destination.parent().map(Path::to_path_buf))
                .unwrap_or_default();
            groups.insert(
                key,
                PlannedGroup {
                    group,
                    directory,
                    rejected,
                },
            );
        }

        // Manifest order, with each group's members contiguous and in index
        // order at the position of the group's first listed member.
        let position: HashMap<&str, usize> = files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.file.name.as_str(), i))
            .collect();
        let mut order = Vec::with_capacity(files.len());
        let mut emitted: HashSet<&str> = HashSet::new();
        for planned in &files {
            match planned.group.as_deref() {
                None => order.push(position[planned.file.name.as_str()]),
                Some(key) if emitted.insert(key) => {
                    order.extend(
                        groups[key]
                            .group
                            .members
                            .iter()
                            .map(|m| position[m.file.name.as_str()]),
                    );
                }
                Some(_) => {}
            }
        }

        Ok(Plan {
            files,
            groups,
            order,
        })
    }

    /// Run one transfer. Never touches shared state; the caller records the
    /// result.
    async fn transfer(
        &self,
        index: usize,
        planned: &PlannedFile,
        catalog: &dyn RemoteCatalog,
        options: &AcquireOptions,
        cancel: CancellationToken,
    ) -> (usize, std::result::Result<DownloadReport, DownloadError>) {
        let request = catalog.authorize(&planned.file);
        let progress: Option<ProgressCallback> = options.on_progress.clone().map(|callback| {
            let name = planned.file.name.clone();
            Arc::new(move |progress: &DownloadProgress| callback(&name, progress))
                as ProgressCallback
        });

        info!(
            "Downloading {} to {}",
            planned.file.name,
            planned.destination.display()
        );
        let result = match &self.retry {
            Some(retry) => {
                self.downloader
                    .download_with_retry(
                        &request.url,
                        request.bearer.as_deref(),
                        &planned.destination,
                        progress.as_ref(),
                        &cancel,
                        retry,
                    )
                    .await
            }
            None => {
                self.downloader
                    .download_with(
                        &request.url,
                        request.bearer.as_deref(),
                        &planned.destination,
                        progress.as_ref(),
                        &cancel,
                    )
                    .await
            }
        };

        if let Err(e) = &result {
            if e.is_cancelled() {
                debug!("Transfer of {} cancelled", planned.file.name);
            } else {
                error!("Download of {} failed: {}", planned.file.name, e);
            }
        }
        (index, result)
    }

    /// -> Verified. A mismatching file stays on disk but counts as failed.
    fn verify(
        &self,
        planned: &PlannedFile,
        result: std::result::Result<DownloadReport, DownloadError>,
    ) -> FileStatus {
        let report = match result {
            Ok(report) => report,
            Err(e) if e.is_cancelled() => return FileFailure::Cancelled.into(),
            Err(e) => return FileFailure::Download(e).into(),
        };

        if let Some(expected) = &planned.expected_sha256 {
            if *expected != report.sha256 {
                warn!(
                    "Hash mismatch for {}: expected {}, got {}",
                    planned.destination.display(),
                    expected,
                    report.sha256
                );
                return FileFailure::HashMismatch {
                    expected: expected.clone(),
                    actual: report.sha256,
                }
                .into();
            }
            debug!("Verified {}", planned.destination.display());
        }

        FileStatus::Succeeded {
            bytes: report.bytes,
            sha256: report.sha256,
        }
    }

    /// -> Done: fill in group failures, then write provenance for the
    /// primary artifact.
    fn finish(
        &self,
        reference: SourceReference,
        manifest: &ResolvedManifest,
        plan: Plan,
        results: Vec<Option<JobResult>>,
    ) -> AcquisitionOutcome {
        let mut groups = Vec::with_capacity(plan.groups.len());
        let mut group_failures: HashMap<String, FileFailure> = HashMap::new();

        for (key, planned) in &plan.groups {
            let failure = match &planned.rejected {
                Some(rejected) => Some(rejected.clone()),
                None => {
                    let missing: Vec<u32> = planned
                        .group
                        .members
                        .iter()
                        .filter(|member| {
                            let index = plan
                                .files
                                .iter()
                                .position(|f| f.file.name == member.file.name);
                            !matches!(
                                index.and_then(|i| results[i].as_ref()),
                                Some(JobResult::Done(status)) if status.is_success()
                            )
                        })
                        .map(|member| member.index)
                        .collect();
                    (!missing.is_empty()).then(|| FileFailure::IncompleteSegments {
                        group: key.clone(),
                        missing,
                    })
                }
            };

            if let Some(failure) = &failure {
                group_failures.insert(key.clone(), failure.clone());
            }
            groups.push(GroupOutcome {
                key: key.clone(),
                base_name: planned.group.base_name.clone(),
                total_segments: planned.group.total_segments,
                directory: planned.directory.clone(),
                failure,
            });
        }

        let files: Vec<FileOutcome> = plan
            .files
            .into_iter()
            .zip(results)
            .map(|(planned, result)| {
                let group_failure = || {
                    planned
                        .group
                        .as_ref()
                        .and_then(|key| group_failures.get(key).cloned())
                        .unwrap_or(FileFailure::Cancelled)
                };
                let status = match result {
                    Some(JobResult::Done(status)) => status,
                    Some(JobResult::GroupAborted) | None => group_failure().into(),
                };
                FileOutcome {
                    name: planned.file.name,
                    category: planned.category,
                    destination: planned.destination,
                    segment_group: planned.group,
                    status,
                }
            })
            .collect();

        let all_succeeded = files.iter().all(|f| f.status.is_success());
        let provenance = self.write_provenance(manifest, &files, &plan.groups, &group_failures);

        AcquisitionOutcome {
            source: manifest.source,
            title: manifest.title.clone(),
            reference,
            files,
            groups,
            provenance,
            all_succeeded,
        }
    }

    /// Best effort: failures are logged and never change the outcome.
    ///
    /// Members of a failed segment group are never recorded. A complete
    /// group gets one record describing the whole artifact, written next to
    /// its first segment.
    fn write_provenance(
        &self,
        manifest: &ResolvedManifest,
        files: &[FileOutcome],
        groups: &BTreeMap<String, PlannedGroup>,
        group_failures: &HashMap<String, FileFailure>,
    ) -> Option<PathBuf> {
        let recordable = move || {
            files.iter().filter(move |f| {
                f.status.is_success()
                    && f.segment_group
                        .as_ref()
                        .map_or(true, |key| !group_failures.contains_key(key))
            })
        };
        let primary = recordable()
            .find(|f| is_main_model_file(&f.name))
            .or_else(|| {
                CategoryClassifier::lookup_type_tag(&manifest.type_tag)
                    .and_then(|_| recordable().find(|f| has_weight_extension(&f.name)))
            })?;

        let planned_group = primary
            .segment_group
            .as_ref()
            .and_then(|key| groups.get(key));
        let (artifact, record) = match planned_group {
            Some(planned) => {
                let segments = &planned.group;
                let first = segments
                    .members
                    .first()
                    .and_then(|m| files.iter().find(|f| f.name == m.file.name))
                    .unwrap_or(primary);
                let file_name = format!("{}.{}", segments.display_name(), segments.extension);
                let record = ProvenanceRecord::from_manifest(
                    manifest,
                    file_name,
                    segments.total_bytes(),
                    primary.category,
                    None,
                )
                .with_segment_count(segments.total_segments);
                (&first.destination, record)
            }
            None => {
                let FileStatus::Succeeded { bytes, sha256 } = &primary.status else {
                    return None;
                };
                let file_name = primary
                    .destination
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| primary.name.clone());
                let record = ProvenanceRecord::from_manifest(
                    manifest,
                    file_name,
                    *bytes,
                    primary.category,
                    Some(sha256.clone()),
                );
                (&primary.destination, record)
            }
        };

        match ProvenanceWriter::write(artifact, &record) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(
                    "Failed to write provenance for {}: {}",
                    artifact.display(),
                    e
                );
                None
            }
        }
    }
}

/// Builder for [`AcquisitionEngine`].
///
/// # Example
///
/// ```rust,ignore
/// use harvest_core::acquisition::{AcquisitionEngine, ModelDirectories};
/// use harvest_core::catalog::{CatalogSet, CatalogTokens};
/// use harvest_core::config::Settings;
///
/// let settings = Settings::default();
/// let catalogs = CatalogSet::from_settings(&settings, CatalogTokens::resolve(None, None))?;
/// let engine = AcquisitionEngine::builder(catalogs)
///     .directories(ModelDirectories::standard_layout("./models"))
///     .max_concurrent_downloads(4)
///     .build()?;
/// ```
pub struct EngineBuilder {
    catalogs: CatalogSet,
    parser: ReferenceParser,
    directories: Option<Arc<dyn DirectoryResolver>>,
    downloader: Option<Downloader>,
    max_concurrent_downloads: usize,
    max_retries: u32,
    retry_base_delay: std::time::Duration,
    verify_remote_hashes: bool,
}

impl EngineBuilder {
    pub fn new(catalogs: CatalogSet) -> Self {
        Self {
            catalogs,
            parser: ReferenceParser::default(),
            directories: None,
            downloader: None,
            max_concurrent_downloads: NetworkConfig::DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            max_retries: 0,
            retry_base_delay: NetworkConfig::DOWNLOAD_RETRY_BASE_DELAY,
            verify_remote_hashes: true,
        }
    }

    /// Apply the tunables from `settings`. Directories are left alone.
    pub fn settings(mut self, settings: &Settings) -> Self {
        self.max_concurrent_downloads = settings.max_concurrent_downloads;
        self.max_retries = settings.max_retries;
        self.verify_remote_hashes = settings.verify_remote_hashes;
        self
    }

    /// Recognise URLs on these hosts instead of the public ones.
    pub fn parser(mut self, parser: ReferenceParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn directories(mut self, directories: impl DirectoryResolver + 'static) -> Self {
        self.directories = Some(Arc::new(directories));
        self
    }

    pub fn downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Files transferred at once. Default: 1 (sequential).
    pub fn max_concurrent_downloads(mut self, limit: usize) -> Self {
        self.max_concurrent_downloads = limit;
        self
    }

    /// Extra attempts after a transient failure. Default: 0.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_base_delay(mut self, delay: std::time::Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Verify against hashes published by the remote. Default: true.
    pub fn verify_remote_hashes(mut self, enable: bool) -> Self {
        self.verify_remote_hashes = enable;
        self
    }

    pub fn build(self) -> Result<AcquisitionEngine> {
        if self.max_concurrent_downloads == 0 {
            return Err(HarvestError::Config {
                message: "max_concurrent_downloads must be at least 1".to_string(),
            });
        }
        if self.catalogs.is_empty() {
            return Err(HarvestError::Config {
                message: "no catalogs enabled".to_string(),
            });
        }

        let downloader = match self.downloader {
            Some(downloader) => downloader,
            None => Downloader::new()?,
        };
        let directories = self.directories.unwrap_or_else(|| {
            Arc::new(ModelDirectories::standard_layout(
                crate::config::PathsConfig::MODELS_DIR_NAME,
            ))
        });
        let retry = (self.max_retries > 0).then(|| {
            RetryConfig::from_max_retries(self.max_retries).with_base_delay(self.retry_base_delay)
        });

        Ok(AcquisitionEngine {
            parser: self.parser,
            classifier: CategoryClassifier::new(),
            catalogs: self.catalogs,
            directories,
            downloader,
            max_concurrent_downloads: self.max_concurrent_downloads,
            retry,
            verify_remote_hashes: self.verify_remote_hashes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ResolvedIds, SearchHit};
    use async_trait::async_trait;

    struct FixedCatalog {
        manifest: ResolvedManifest,
    }

    #[async_trait]
    impl RemoteCatalog for FixedCatalog {
        fn source(&self) -> SourceKind {
            self.manifest.source
        }

        async fn resolve(&self, _reference: &SourceReference) -> Result<ResolvedManifest> {
            Ok(self.manifest.clone())
        }

        async fn search(
            &self,
            _query: &str,
            _limit: usize,
            _type_filter: Option<&str>,
        ) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
    }

    fn hub_manifest(names: &[&str]) -> ResolvedManifest {
        ResolvedManifest::new(
            SourceKind::HuggingFace,
            ResolvedIds {
                repo_id: Some("org/big-model".into()),
                revision: Some("main".into()),
                ..Default::default()
            },
            "org/big-model",
            "",
            names
                .iter()
                .map(|n| RemoteFile::new(*n, 1, format!("http://127.0.0.1:9/{}", n)))
                .collect(),
        )
        .unwrap()
    }

    fn engine(manifest: ResolvedManifest, directories: ModelDirectories) -> AcquisitionEngine {
        AcquisitionEngine::builder(
            CatalogSet::new().with(Arc::new(FixedCatalog { manifest })),
        )
        .directories(directories)
        .build()
        .unwrap()
    }

    #[test]
    fn test_plan_places_hub_files_under_repo_name() {
        let manifest = hub_manifest(&[
            "model_index.json",
            "vae/diffusion_pytorch_model.safetensors",
            "text_encoder/model.safetensors",
        ]);
        let engine = engine(manifest.clone(), ModelDirectories::standard_layout("/m"));

        let plan = engine.plan(&manifest, &AcquireOptions::default()).unwrap();
        assert_eq!(
            plan.files[1].destination,
            PathBuf::from("/m/vae/big-model/vae/diffusion_pytorch_model.safetensors")
        );
        assert_eq!(plan.files[1].category, DestinationCategory::Vae);
        assert_eq!(plan.files[2].category, DestinationCategory::TextEncoder);
        assert_eq!(plan.order, vec![0, 1, 2]);
    }

    #[test]
    fn test_plan_orders_group_members_contiguously() {
        let manifest = hub_manifest(&[
            "diffusion-00002-of-00003.safetensors",
            "config.json",
            "diffusion-00001-of-00003.safetensors",
            "diffusion-00003-of-00003.safetensors",
        ]);
        let engine = engine(manifest.clone(), ModelDirectories::standard_layout("/m"));

        let plan = engine.plan(&manifest, &AcquireOptions::default()).unwrap();
        assert_eq!(plan.order, vec![2, 0, 3, 1]);
        assert!(plan.groups["diffusion.safetensors"].rejected.is_none());
    }

    #[test]
    fn test_plan_rejects_short_and_inconsistent_groups() {
        let manifest = hub_manifest(&[
            "a-00001-of-00003.safetensors",
            "a-00002-of-00003.safetensors",
            "b-00001-of-00002.bin",
            "b-00002-of-00004.bin",
        ]);
        let engine = engine(manifest.clone(), ModelDirectories::standard_layout("/m"));

        let plan = engine.plan(&manifest, &AcquireOptions::default()).unwrap();
        assert_eq!(
            plan.groups["a.safetensors"].rejected,
            Some(FileFailure::IncompleteSegments {
                group: "a.safetensors".into(),
                missing: vec![3]
            })
        );
        assert!(matches!(
            plan.groups["b.bin"].rejected,
            Some(FileFailure::InconsistentSegmentMetadata { .. })
        ));
    }

    #[test]
    fn test_plan_unknown_category_aborts() {
        let manifest = hub_manifest(&["add_detail_lora.safetensors"]);
        let engine = engine(
            manifest.clone(),
            ModelDirectories::new().with_root(DestinationCategory::Checkpoint, "/m/ckpt"),
        );

        let err = engine
            .plan(&manifest, &AcquireOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, HarvestError::UnknownCategory(name) if name == "lora"));
    }

    #[test]
    fn test_plan_overrides() {
        let manifest = ResolvedManifest::new(
            SourceKind::Civitai,
            ResolvedIds::default(),
            "m",
            "",
            vec![RemoteFile::new("weird.safetensors", 1, "http://x/w").with_sha256("AA")],
        )
        .unwrap();
        let engine = engine(manifest.clone(), ModelDirectories::new());

        let options = AcquireOptions {
            destination_override: Some(PathBuf::from("/out")),
            category_override: Some(DestinationCategory::Lora),
            filename_override: Some("renamed.safetensors".into()),
            ..Default::default()
        };
        let plan = engine.plan(&manifest, &options).unwrap();
        assert_eq!(plan.files[0].destination, PathBuf::from("/out/renamed.safetensors"));
        assert_eq!(plan.files[0].category, DestinationCategory::Lora);
        assert_eq!(plan.files[0].expected_sha256.as_deref(), Some("aa"));

        let with_hash = AcquireOptions {
            destination_override: Some(PathBuf::from("/out")),
            expected_hash: Some("BB".into()),
            ..Default::default()
        };
        let plan = engine.plan(&manifest, &with_hash).unwrap();
        assert_eq!(plan.files[0].expected_sha256.as_deref(), Some("bb"));
    }

    #[tokio::test]
    async fn test_invalid_reference_aborts_before_resolve() {
        let engine = engine(hub_manifest(&["a.gguf"]), ModelDirectories::new());
        let err = engine
            .acquire("not a reference", AcquireOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn test_missing_catalog_is_source_unavailable() {
        let engine = engine(hub_manifest(&["a.gguf"]), ModelDirectories::new());
        let err = engine
            .acquire("https://civitai.com/models/1", AcquireOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::SourceUnavailable(_)));
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        let result = AcquisitionEngine::builder(
            CatalogSet::new().with(Arc::new(FixedCatalog {
                manifest: hub_manifest(&["a.gguf"]),
            })),
        )
        .max_concurrent_downloads(0)
        .build();
        assert!(matches!(result, Err(HarvestError::Config { .. })));
    }

    #[test]
    fn test_builder_requires_a_catalog() {
        assert!(AcquisitionEngine::builder(CatalogSet::new()).build().is_err());
    }
}
