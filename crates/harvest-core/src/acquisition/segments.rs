//! Segmented (multi-part) artifact detection and validation.
//!
//! Large models are often split into files named
//! `<base>-<NNNNN>-of-<NNNNN>.<ext>`, e.g. `model-00001-of-00050.safetensors`.
//! Files sharing a base name and extension form one [`SegmentGroup`].
//! Detection never fills gaps: a group with missing members is reported as
//! such by [`SegmentGroup::validate`].

use crate::catalog::RemoteFile;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

/// `<base>-<5 digits>-of-<5 digits>.<ext>`
/// Captures: (base_name, index, total, extension)
static SEGMENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)-(\d{5})-of-(\d{5})\.([^./]+)$").unwrap());

/// One file of a segment group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMember {
    pub file: RemoteFile,
    /// 1-based segment index from the filename.
    pub index: u32,
    /// Total the filename itself declares.
    pub declared_total: u32,
}

/// Files that together form one logical artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentGroup {
    pub base_name: String,
    pub total_segments: u32,
    pub extension: String,
    /// Sorted ascending by `index`.
    pub members: Vec<SegmentMember>,
}

/// Result of a segment group completeness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentValidation {
    Complete,
    /// Members disagree on the declared total, or carry an index outside
    /// `1..=total_segments`.
    Inconsistent {
        totals: Vec<u32>,
        out_of_range: Vec<u32>,
    },
    /// Some indices in `1..=total_segments` are not listed.
    Incomplete { missing: Vec<u32> },
}

impl SegmentValidation {
    pub fn is_complete(&self) -> bool {
        matches!(self, SegmentValidation::Complete)
    }
}

impl SegmentGroup {
    /// Map key used by [`detect`]: base name plus extension.
    pub fn key(&self) -> String {
        format!("{}.{}", self.base_name, self.extension)
    }

    /// Last path component of the base name, e.g. `model` for
    /// `text_encoder_2/model`.
    pub fn display_name(&self) -> &str {
        self.base_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.base_name)
    }

    pub fn total_bytes(&self) -> u64 {
        self.members.iter().map(|m| m.file.size_bytes).sum()
    }

    /// Check that every declared segment is present and all members agree
    /// on the total.
    pub fn validate(&self) -> SegmentValidation {
        let totals: BTreeSet<u32> = self.members.iter().map(|m| m.declared_total).collect();
        let out_of_range: Vec<u32> = self
            .members
            .iter()
            .map(|m| m.index)
            .filter(|idx| *idx == 0 || *idx > self.total_segments)
            .collect();
        if totals.len() > 1 || !out_of_range.is_empty() {
            return SegmentValidation::Inconsistent {
                totals: totals.into_iter().collect(),
                out_of_range,
            };
        }

        let found: BTreeSet<u32> = self.members.iter().map(|m| m.index).collect();
        let missing: Vec<u32> = (1..=self.total_segments)
            .filter(|idx| !found.contains(idx))
            .collect();

        if missing.is_empty() {
            SegmentValidation::Complete
        } else {
            SegmentValidation::Incomplete { missing }
        }
    }
}

/// Parse a segment filename into `(base_name, index, total, extension)`.
pub fn parse_segment_name(name: &str) -> Option<(String, u32, u32, String)> {
    let caps = SEGMENT_PATTERN.captures(name)?;
    let index: u32 = caps[2].parse().ok()?;
    let total: u32 = caps[3].parse().ok()?;
    Some((caps[1].to_string(), index, total, caps[4].to_string()))
}

/// Group segment files by `(base_name, extension)`.
///
/// Files not matching the segment grammar are left out entirely. Groups are
/// keyed by [`SegmentGroup::key`]; `total_segments` is taken from the first
/// member seen and members are sorted by index.
///
/// # Example
///
/// ```
/// use harvest_core::acquisition::segments::detect;
/// use harvest_core::catalog::RemoteFile;
///
/// let files = vec![
///     RemoteFile::new("model-00002-of-00002.safetensors", 10, "https://x/2"),
///     RemoteFile::new("model-00001-of-00002.safetensors", 10, "https://x/1"),
///     RemoteFile::new("config.json", 1, "https://x/c"),
/// ];
///
/// let groups = detect(&files);
/// let group = &groups["model.safetensors"];
/// assert_eq!(group.base_name, "model");
/// assert_eq!(group.members[0].index, 1);
/// assert!(group.validate().is_complete());
/// ```
pub fn detect(files: &[RemoteFile]) -> BTreeMap<String, SegmentGroup> {
    let mut groups: BTreeMap<String, SegmentGroup> = BTreeMap::new();

    for file in files {
        let Some((base_name, index, total, extension)) = parse_segment_name(&file.name) else {
            continue;
        };

        let key = format!("{}.{}", base_name, extension);
        let group = groups.entry(key).or_insert_with(|| SegmentGroup {
            base_name,
            total_segments: total,
            extension,
            members: Vec::new(),
        });
        group.members.push(SegmentMember {
            file: file.clone(),
            index,
            declared_total: total,
        });
    }

    for group in groups.values_mut() {
        group.members.sort_by_key(|m| m.index);
    }

    groups
}
