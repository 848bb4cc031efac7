//! Build target names and tool-output parsing
//!
//! Targets are opaque strings owned by the build tool (`//pkg:name`).
//! This module parses the tool's JSON answers into typed records: the
//! concrete target lists produced by normalization queries, the
//! `target → source-db path` mapping of build invocations, and the
//! per-target attribute bags of owner queries.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use sextant_config::ToolVersion;

use crate::error::BuildResult;

/// A concrete build target
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildTarget(String);

impl BuildTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BuildTarget {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The source-db output flavor suffix a target is built with
fn source_db_suffix(version: ToolVersion) -> &'static str {
    match version {
        ToolVersion::V1 => "#source-db",
        ToolVersion::V2 => "[source-db]",
    }
}

/// `target` → `target#source-db` (or the v2 bracket flavor)
pub fn source_db_spec(version: ToolVersion, target: &BuildTarget) -> String {
    format!("{}{}", target, source_db_suffix(version))
}

/// Parse a normalization query answer: an object whose values are arrays
/// of target strings. The result is deduplicated and sorted.
pub fn parse_normalization_output(text: &str) -> BuildResult<Vec<BuildTarget>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let mut targets = BTreeSet::new();
    if let Some(object) = value.as_object() {
        for entry in object.values() {
            if let Some(names) = entry.as_array() {
                for name in names {
                    if let Some(name) = name.as_str() {
                        targets.insert(BuildTarget::new(name));
                    }
                }
            }
        }
    }
    Ok(targets.into_iter().collect())
}

/// Parse a build invocation answer: an object mapping
/// `target#source-db` (v1) or `target[source-db]` (v2) to the absolute
/// path of the per-target source database.
pub fn parse_build_output(
    text: &str,
    version: ToolVersion,
) -> BuildResult<Vec<(BuildTarget, PathBuf)>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let suffix = source_db_suffix(version);
    let mut pairs = Vec::new();
    if let Some(object) = value.as_object() {
        for (spec, path) in object {
            let Some(path) = path.as_str() else { continue };
            let target = spec.strip_suffix(suffix).unwrap_or(spec);
            pairs.push((BuildTarget::new(target), PathBuf::from(path)));
        }
    }
    pairs.sort();
    Ok(pairs)
}

/// Everything needed to rebuild one owning target's slice of the build
/// map without a fresh build: the two base paths and the relative pairs
/// underneath them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedTargets {
    pub target: BuildTarget,
    /// Where the target's sources live, relative to the source root
    pub source_base_path: PathBuf,
    /// Where the target's artifacts land, relative to the artifact root
    pub artifact_base_path: PathBuf,
    /// `(artifact name, source path)` pairs relative to the base paths
    pub pairs: Vec<(PathBuf, PathBuf)>,
}

impl ChangedTargets {
    /// Expand into build-map pairs relative to the two roots
    pub fn build_map_pairs(&self) -> Vec<(PathBuf, PathBuf)> {
        self.pairs
            .iter()
            .map(|(artifact, source)| {
                (
                    self.artifact_base_path.join(artifact),
                    self.source_base_path.join(source),
                )
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct OwnerAttributes {
    #[serde(rename = "buck.base_path")]
    base_path: PathBuf,
    #[serde(rename = "buck.base_module")]
    buck_base_module: Option<String>,
    #[serde(default)]
    base_module: Option<String>,
    #[serde(default)]
    srcs: serde_json::Map<String, serde_json::Value>,
}

/// Parse an owner query answer: per-target attribute bags.
///
/// The artifact base is `base_module` (dots mapped to separators) when
/// present, falling back to `buck.base_module`, then to the source base
/// path. Source values starting with `//` reference other cells and are
/// skipped.
pub fn parse_owner_output(text: &str) -> BuildResult<Vec<ChangedTargets>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object() else {
        return Ok(Vec::new());
    };
    let mut records = Vec::new();
    for (target, attributes) in object {
        let attributes: OwnerAttributes = serde_json::from_value(attributes.clone())?;
        let artifact_base_path = attributes
            .base_module
            .as_deref()
            .or(attributes.buck_base_module.as_deref())
            .map(module_to_path)
            .unwrap_or_else(|| attributes.base_path.clone());
        let mut pairs = Vec::new();
        for (artifact, source) in &attributes.srcs {
            let Some(source) = source.as_str() else { continue };
            if source.starts_with("//") {
                continue;
            }
            pairs.push((PathBuf::from(artifact), PathBuf::from(source)));
        }
        pairs.sort();
        records.push(ChangedTargets {
            target: BuildTarget::new(target),
            source_base_path: attributes.base_path,
            artifact_base_path,
            pairs,
        });
    }
    records.sort_by(|left, right| left.target.cmp(&right.target));
    Ok(records)
}

fn module_to_path(module: &str) -> PathBuf {
    if module.is_empty() {
        PathBuf::new()
    } else {
        module.split('.').collect()
    }
}

/// The query expression resolving target patterns to concrete analyzable
/// targets: Python libraries, binaries, and tests, minus targets labeled
/// `generated` or `no-typecheck`, plus `unittest-library` targets.
pub fn normalization_query(patterns: &[String]) -> String {
    let target_set = patterns
        .iter()
        .map(|pattern| format!("'{pattern}'"))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "(kind('python_binary|python_library|python_test', set({target_set})) \
         + attrfilter('labels', 'unittest-library', set({target_set}))) \
         - attrfilter('labels', 'generated', set({target_set})) \
         - attrfilter('labels', 'no-typecheck', set({target_set}))"
    )
}

/// The query expression resolving changed source files to their owning
/// targets
pub fn owner_query(changed_paths: &[PathBuf]) -> String {
    let paths = changed_paths
        .iter()
        .map(|path| format!("'{}'", path.display()))
        .collect::<Vec<_>>()
        .join(" ");
    format!("owner(set({paths}))")
}
