//! Source-database documents
//!
//! The build tool describes its relocation of Python sources through
//! "source databases": per-target JSON files mapping artifact-relative
//! paths to source-relative paths, and (for the lazy builder) one merged
//! document covering every owning target of a working set.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use sextant_buildmap::BuildMap;

use crate::error::{BuildError, BuildResult};

/// Generated files the tool emits alongside real sources; they carry no
/// code the analyzer should see.
pub const HOUSEKEEPING_FILE_NAMES: [&str; 3] =
    ["__manifest__.py", "__test_main__.py", "__test_modules__.py"];

/// Drop housekeeping entries from a per-target build map
pub fn filter_housekeeping(build_map: &BuildMap) -> BuildMap {
    build_map.filter(|artifact, _| {
        artifact
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| !HOUSEKEEPING_FILE_NAMES.contains(&name))
            .unwrap_or(true)
    })
}

/// Load one target's source database from disk.
///
/// The document is `{ "sources": {...}, "dependencies": {...} }`;
/// `dependencies` is ignored and duplicate artifact keys resolve
/// first-wins.
pub async fn load_partial_build_map(path: &Path) -> BuildResult<BuildMap> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|error| BuildError::io(path, error))?;
    let value: serde_json::Value = serde_json::from_slice(&contents)?;
    Ok(BuildMap::from_json_value_lenient(&value)?)
}

/// Conflict record attached to a target the lazy builder dropped
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DroppedTargetConflict {
    pub conflict_with: String,
    pub artifact_path: PathBuf,
    pub preserved_source_path: PathBuf,
    pub dropped_source_path: PathBuf,
}

/// The lazy builder's merged source database
#[derive(Debug)]
pub struct MergedSourceDb {
    pub build_map: BuildMap,
    pub built_targets_count: u64,
    pub dropped_targets: BTreeMap<String, DroppedTargetConflict>,
}

#[derive(Debug, Deserialize)]
struct MergedSourceDbDocument {
    build_map: serde_json::Value,
    built_targets_count: u64,
    #[serde(default)]
    dropped_targets: BTreeMap<String, DroppedTargetConflict>,
}

/// Parse the merged source database the lazy builder prints
pub fn parse_merged_source_db(text: &str) -> BuildResult<MergedSourceDb> {
    let document: MergedSourceDbDocument = serde_json::from_str(text)?;
    let build_map = BuildMap::from_json_value_lenient(&document.build_map)?;
    Ok(MergedSourceDb {
        build_map,
        built_targets_count: document.built_targets_count,
        dropped_targets: document.dropped_targets,
    })
}
