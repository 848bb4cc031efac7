//! Build interfaces
//!
//! One interface per tool flavor: [`V1Interface`] and [`V2Interface`]
//! drive the classic per-target source-db pipeline, [`LazyInterface`]
//! drives the dedicated lazy builder that discovers owning targets from a
//! working set. All flavors normalize targets through queries and merge
//! per-target build maps with the same conflict policy: a target whose
//! sources genuinely disagree with an earlier target is dropped and
//! reported, never silently clobbered.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, warn};

use sextant_buildmap::{resolve_name_or_content_equal, BuildMap};
use sextant_config::ToolVersion;

use crate::error::BuildResult;
use crate::raw::RawCommand;
use crate::source_db::{
    filter_housekeeping, load_partial_build_map, parse_merged_source_db, MergedSourceDb,
};
use crate::target::{
    normalization_query, owner_query, parse_build_output, parse_normalization_output,
    parse_owner_output, source_db_spec, BuildTarget, ChangedTargets,
};

/// A merged build map together with the targets that survived merging
#[derive(Debug)]
pub struct ConstructedBuildMap {
    pub build_map: BuildMap,
    pub targets: Vec<BuildTarget>,
}

/// Operations every classic build interface provides
#[async_trait]
pub trait BuildInterface: Send + Sync {
    /// Resolve target patterns to a deduplicated, sorted list of concrete
    /// analyzable targets
    async fn normalize_targets(&self, patterns: &[String]) -> BuildResult<Vec<BuildTarget>>;

    /// Build every target's source database and merge the partial build
    /// maps deterministically
    async fn construct_build_map(
        &self,
        targets: &[BuildTarget],
    ) -> BuildResult<ConstructedBuildMap>;

    /// For each target owning one of `changed_paths`, return the record
    /// needed to splice its slice of the build map without a full build
    async fn query_owner_targets(
        &self,
        targets: &[BuildTarget],
        changed_paths: &[PathBuf],
    ) -> BuildResult<Vec<ChangedTargets>>;
}

/// Shared knobs of the concrete interfaces
#[derive(Debug, Clone)]
struct InterfaceOptions {
    source_root: PathBuf,
    mode: Option<String>,
    isolation_prefix: Option<String>,
}

impl InterfaceOptions {
    fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    fn isolation_prefix(&self) -> Option<&str> {
        self.isolation_prefix.as_deref()
    }
}

/// Classic interface for version 1 of the build tool
pub struct V1Interface<R> {
    raw: R,
    options: InterfaceOptions,
}

/// Classic interface for version 2 of the build tool
pub struct V2Interface<R> {
    raw: R,
    options: InterfaceOptions,
}

impl<R: RawCommand> V1Interface<R> {
    pub fn new(
        raw: R,
        source_root: impl Into<PathBuf>,
        mode: Option<String>,
        isolation_prefix: Option<String>,
    ) -> Self {
        Self {
            raw,
            options: InterfaceOptions {
                source_root: source_root.into(),
                mode,
                isolation_prefix,
            },
        }
    }
}

impl<R: RawCommand> V2Interface<R> {
    pub fn new(
        raw: R,
        source_root: impl Into<PathBuf>,
        mode: Option<String>,
        isolation_prefix: Option<String>,
    ) -> Self {
        Self {
            raw,
            options: InterfaceOptions {
                source_root: source_root.into(),
                mode,
                isolation_prefix,
            },
        }
    }
}

#[async_trait]
impl<R: RawCommand> BuildInterface for V1Interface<R> {
    async fn normalize_targets(&self, patterns: &[String]) -> BuildResult<Vec<BuildTarget>> {
        normalize_targets(&self.raw, &self.options, patterns).await
    }

    async fn construct_build_map(
        &self,
        targets: &[BuildTarget],
    ) -> BuildResult<ConstructedBuildMap> {
        construct_build_map(&self.raw, &self.options, ToolVersion::V1, targets).await
    }

    async fn query_owner_targets(
        &self,
        targets: &[BuildTarget],
        changed_paths: &[PathBuf],
    ) -> BuildResult<Vec<ChangedTargets>> {
        query_owner_targets(&self.raw, &self.options, targets, changed_paths).await
    }
}

#[async_trait]
impl<R: RawCommand> BuildInterface for V2Interface<R> {
    async fn normalize_targets(&self, patterns: &[String]) -> BuildResult<Vec<BuildTarget>> {
        normalize_targets(&self.raw, &self.options, patterns).await
    }

    async fn construct_build_map(
        &self,
        targets: &[BuildTarget],
    ) -> BuildResult<ConstructedBuildMap> {
        construct_build_map(&self.raw, &self.options, ToolVersion::V2, targets).await
    }

    async fn query_owner_targets(
        &self,
        targets: &[BuildTarget],
        changed_paths: &[PathBuf],
    ) -> BuildResult<Vec<ChangedTargets>> {
        query_owner_targets(&self.raw, &self.options, targets, changed_paths).await
    }
}

async fn normalize_targets<R: RawCommand>(
    raw: &R,
    options: &InterfaceOptions,
    patterns: &[String],
) -> BuildResult<Vec<BuildTarget>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let arguments = vec!["--json".to_owned(), normalization_query(patterns)];
    let output = raw
        .query(options.mode(), options.isolation_prefix(), &arguments)
        .await?;
    parse_normalization_output(&output)
}

async fn construct_build_map<R: RawCommand>(
    raw: &R,
    options: &InterfaceOptions,
    version: ToolVersion,
    targets: &[BuildTarget],
) -> BuildResult<ConstructedBuildMap> {
    let mut sorted_targets = targets.to_vec();
    sorted_targets.sort();
    sorted_targets.dedup();

    let mut arguments = vec!["--show-full-json-output".to_owned()];
    arguments.extend(
        sorted_targets
            .iter()
            .map(|target| source_db_spec(version, target)),
    );
    let output = raw
        .build(options.mode(), options.isolation_prefix(), &arguments)
        .await?;
    let db_paths = parse_build_output(&output, version)?;

    // Independent per-target loads run concurrently; the deterministic
    // merge order comes from the sort above, preserved by try_join_all.
    let partials = try_join_all(db_paths.iter().map(|(target, path)| async move {
        let partial = load_partial_build_map(path).await?;
        debug!(build_target = %target, entries = partial.len(), "loaded source database");
        Ok::<_, crate::error::BuildError>((target.clone(), filter_housekeeping(&partial)))
    }))
    .await?;

    Ok(merge_partial_build_maps(&options.source_root, partials))
}

/// Merge per-target partial maps in order, dropping conflicting targets.
///
/// The only recovery-by-data-loss in the subsystem: a dropped target must
/// be visible in the logs.
pub(crate) fn merge_partial_build_maps(
    source_root: &Path,
    partials: Vec<(BuildTarget, BuildMap)>,
) -> ConstructedBuildMap {
    let mut build_map = BuildMap::new();
    let mut survivors = Vec::with_capacity(partials.len());
    let mut resolve = resolve_name_or_content_equal(source_root);
    for (target, partial) in partials {
        match build_map.merge(&partial, &mut resolve) {
            Ok(merged) => {
                build_map = merged;
                survivors.push(target);
            }
            Err(conflict) => {
                warn!(
                    build_target = %target,
                    artifact = %conflict.artifact.display(),
                    preserved = %conflict.left_source.display(),
                    dropped = %conflict.right_source.display(),
                    "target conflicts with an earlier target, dropping it from analysis"
                );
            }
        }
    }
    ConstructedBuildMap {
        build_map,
        targets: survivors,
    }
}

async fn query_owner_targets<R: RawCommand>(
    raw: &R,
    options: &InterfaceOptions,
    targets: &[BuildTarget],
    changed_paths: &[PathBuf],
) -> BuildResult<Vec<ChangedTargets>> {
    if changed_paths.is_empty() {
        return Ok(Vec::new());
    }
    let changed: Vec<PathBuf> = changed_paths.iter().cloned().collect();
    let arguments = vec![
        "--json".to_owned(),
        owner_query(&changed),
        "--output-attributes".to_owned(),
        "buck.base_path".to_owned(),
        "buck.base_module".to_owned(),
        "base_module".to_owned(),
        "srcs".to_owned(),
    ];
    let output = raw
        .query(options.mode(), options.isolation_prefix(), &arguments)
        .await?;
    let records = parse_owner_output(&output)?;
    // Owners outside the normalized target set are not analyzed.
    Ok(records
        .into_iter()
        .filter(|record| targets.contains(&record.target))
        .collect())
}

/// Lazy interface: discovers and builds only the targets owning a working
/// set of sources. Used with version 2 of the tool.
pub struct LazyInterface<R> {
    raw: R,
    options: InterfaceOptions,
}

impl<R: RawCommand> LazyInterface<R> {
    pub fn new(
        raw: R,
        source_root: impl Into<PathBuf>,
        mode: Option<String>,
        isolation_prefix: Option<String>,
    ) -> Self {
        Self {
            raw,
            options: InterfaceOptions {
                source_root: source_root.into(),
                mode,
                isolation_prefix,
            },
        }
    }
}

/// The lazy flavor's single construction operation
#[async_trait]
pub trait LazyBuildInterface: Send + Sync {
    /// Determine and build the targets owning `source_paths` (relative to
    /// the source root) and return their merged build map
    async fn construct_build_map_for_sources(
        &self,
        source_paths: &[PathBuf],
    ) -> BuildResult<ConstructedBuildMap>;
}

#[async_trait]
impl<R: RawCommand> LazyBuildInterface for LazyInterface<R> {
    async fn construct_build_map_for_sources(
        &self,
        source_paths: &[PathBuf],
    ) -> BuildResult<ConstructedBuildMap> {
        let mut arguments = vec!["--sources".to_owned()];
        arguments.extend(
            source_paths
                .iter()
                .map(|path| path.display().to_string()),
        );
        let output = self
            .raw
            .build(
                self.options.mode(),
                self.options.isolation_prefix(),
                &arguments,
            )
            .await?;
        let MergedSourceDb {
            build_map,
            built_targets_count,
            dropped_targets,
        } = parse_merged_source_db(&output)?;
        for (target, conflict) in &dropped_targets {
            warn!(
                build_target = %target,
                conflict_with = %conflict.conflict_with,
                artifact = %conflict.artifact_path.display(),
                preserved = %conflict.preserved_source_path.display(),
                dropped = %conflict.dropped_source_path.display(),
                "lazy build dropped a conflicting target"
            );
        }
        debug!(built_targets_count, "lazy build finished");
        Ok(ConstructedBuildMap {
            build_map: filter_housekeeping(&build_map),
            targets: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_partial_build_maps_drops_conflicting_target() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("foo")).unwrap();
        std::fs::create_dir_all(dir.path().join("bar")).unwrap();
        std::fs::write(dir.path().join("foo/a.py"), "left").unwrap();
        std::fs::write(dir.path().join("bar/a.py"), "right").unwrap();

        let partials = vec![
            (
                BuildTarget::new("//t:one"),
                BuildMap::from_pairs([("a.py", "foo/a.py")]).unwrap(),
            ),
            (
                BuildTarget::new("//t:two"),
                BuildMap::from_pairs([("a.py", "bar/a.py")]).unwrap(),
            ),
        ];
        let constructed = merge_partial_build_maps(dir.path(), partials);

        assert_eq!(constructed.targets, vec![BuildTarget::new("//t:one")]);
        assert_eq!(
            constructed.build_map.source_of(Path::new("a.py")),
            Some(Path::new("foo/a.py"))
        );
    }

    #[test]
    fn test_merge_partial_build_maps_accepts_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("foo")).unwrap();
        std::fs::create_dir_all(dir.path().join("bar")).unwrap();
        std::fs::write(dir.path().join("foo/a.py"), "same").unwrap();
        std::fs::write(dir.path().join("bar/a.py"), "same").unwrap();

        let partials = vec![
            (
                BuildTarget::new("//t:one"),
                BuildMap::from_pairs([("a.py", "foo/a.py")]).unwrap(),
            ),
            (
                BuildTarget::new("//t:two"),
                BuildMap::from_pairs([("a.py", "bar/a.py")]).unwrap(),
            ),
        ];
        let constructed = merge_partial_build_maps(dir.path(), partials);

        assert_eq!(constructed.targets.len(), 2);
        assert_eq!(
            constructed.build_map.source_of(Path::new("a.py")),
            Some(Path::new("foo/a.py"))
        );
    }
}
