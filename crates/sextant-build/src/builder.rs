//! Build orchestration
//!
//! [`Builder`] owns the build state for classic (up-front target set)
//! sessions: the normalized targets, the current build map, and its
//! indexed view. Incremental rebuilds come in decreasing cost:
//!
//! | Variant | Preconditions |
//! |---|---|
//! | [`Builder::full_incremental_build`] | target set may have changed |
//! | [`Builder::incremental_build_with_normalized_targets`] | target set unchanged |
//! | [`Builder::fast_incremental_build`] | target set unchanged and no generated code affected |
//!
//! Callers pick the cheapest variant whose preconditions hold; a changed
//! recipe file always disqualifies the fast path. [`LazyBuilder`] covers
//! sessions that discover targets on demand from a working set.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::info;

use sextant_buildmap::{artifacts, BuildMap, IndexedBuildMap};
use sextant_config::BuildSection;

use crate::error::{BuildError, BuildResult};
use crate::interface::{BuildInterface, ConstructedBuildMap, LazyBuildInterface};
use crate::target::BuildTarget;

/// Timings of one build invocation
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// Time resolving target patterns (zero when normalization is skipped)
    pub normalize_time: Duration,
    /// Time constructing the new build map
    pub construct_time: Duration,
    /// Time patching the artifact tree
    pub apply_time: Duration,
    /// End-to-end build time
    pub total_time: Duration,
}

/// Result of one (re)build
#[derive(Debug)]
pub struct BuildOutcome {
    /// Targets that survived merging
    pub targets: Vec<BuildTarget>,
    /// Absolute artifact paths created, retargeted, or removed; the module
    /// tracker ingests these as filesystem events
    pub artifact_path_events: Vec<PathBuf>,
    /// Build timings
    pub stats: BuildStats,
}

/// Classic builder: the target set is normalized up front
pub struct Builder<I> {
    source_root: PathBuf,
    artifact_root: PathBuf,
    interface: I,
    targets: Vec<BuildTarget>,
    build_map: BuildMap,
    index: IndexedBuildMap,
}

impl<I: BuildInterface> Builder<I> {
    /// Create a builder with empty state
    pub fn new(
        source_root: impl Into<PathBuf>,
        artifact_root: impl Into<PathBuf>,
        interface: I,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            artifact_root: artifact_root.into(),
            interface,
            targets: Vec::new(),
            build_map: BuildMap::new(),
            index: IndexedBuildMap::default(),
        }
    }

    /// Cold build: normalize the patterns, construct the build map, and
    /// materialize the artifact tree from scratch
    pub async fn build(&mut self, patterns: &[String]) -> BuildResult<BuildOutcome> {
        let build_start = Instant::now();

        let normalize_start = Instant::now();
        let targets = self.interface.normalize_targets(patterns).await?;
        let normalize_time = normalize_start.elapsed();
        info!(targets = targets.len(), "normalized target patterns");

        let construct_start = Instant::now();
        let ConstructedBuildMap { build_map, targets } =
            self.interface.construct_build_map(&targets).await?;
        let construct_time = construct_start.elapsed();

        let apply_start = Instant::now();
        artifacts::populate(&self.source_root, &self.artifact_root, &build_map).await?;
        let apply_time = apply_start.elapsed();

        let artifact_path_events = build_map
            .artifacts()
            .map(|artifact| self.artifact_root.join(artifact))
            .collect();
        self.replace_state(targets.clone(), build_map);

        let stats = BuildStats {
            normalize_time,
            construct_time,
            apply_time,
            total_time: build_start.elapsed(),
        };
        info!(
            targets = targets.len(),
            entries = self.build_map.len(),
            total_ms = stats.total_time.as_millis() as u64,
            "cold build finished"
        );
        Ok(BuildOutcome {
            targets,
            artifact_path_events,
            stats,
        })
    }

    /// Materialize a pre-existing build map (e.g. recovered from saved
    /// state) without consulting the build tool
    pub async fn restore(&mut self, build_map: BuildMap) -> BuildResult<()> {
        artifacts::populate(&self.source_root, &self.artifact_root, &build_map).await?;
        self.replace_state(Vec::new(), build_map);
        info!(entries = self.build_map.len(), "restored artifact tree from saved build map");
        Ok(())
    }

    /// Incremental rebuild when the target set may have changed:
    /// re-normalize, reconstruct, diff, apply
    pub async fn full_incremental_build(&mut self, patterns: &[String]) -> BuildResult<BuildOutcome> {
        let build_start = Instant::now();
        let normalize_start = Instant::now();
        let targets = self.interface.normalize_targets(patterns).await?;
        let normalize_time = normalize_start.elapsed();
        self.reconstruct_and_apply(targets, normalize_time, build_start)
            .await
    }

    /// Incremental rebuild with a known-unchanged target set: skip
    /// normalization, reconstruct, diff, apply
    pub async fn incremental_build_with_normalized_targets(
        &mut self,
        targets: Vec<BuildTarget>,
    ) -> BuildResult<BuildOutcome> {
        let build_start = Instant::now();
        self.reconstruct_and_apply(targets, Duration::ZERO, build_start)
            .await
    }

    /// Fastest rebuild: no re-normalize, no re-build. Valid only when the
    /// target set is unchanged and no changed file affects generated code.
    ///
    /// Splices the owning targets' fresh pairs into the previous build
    /// map: entries backed by removed sources drop out, owner pairs
    /// overwrite what they cover.
    pub async fn fast_incremental_build(
        &mut self,
        changed_sources: &[PathBuf],
        removed_sources: &[PathBuf],
    ) -> BuildResult<BuildOutcome> {
        let build_start = Instant::now();

        let changed_relative = self.relativize_sources(changed_sources)?;
        let removed_relative: HashSet<PathBuf> =
            self.relativize_sources(removed_sources)?.into_iter().collect();

        let construct_start = Instant::now();
        let owner_records = self
            .interface
            .query_owner_targets(&self.targets, &changed_relative)
            .await?;
        let mut pairs: Vec<(PathBuf, PathBuf)> = self
            .build_map
            .iter()
            .filter(|(_, source)| !removed_relative.contains(*source))
            .map(|(artifact, source)| (artifact.to_path_buf(), source.to_path_buf()))
            .collect();
        for record in &owner_records {
            pairs.extend(record.build_map_pairs());
        }
        // Later pairs must win, so feed them to the lenient constructor in
        // reverse.
        pairs.reverse();
        let new_map = BuildMap::from_pairs_lenient(pairs);
        let construct_time = construct_start.elapsed();

        let targets = self.targets.clone();
        let mut outcome = self
            .diff_and_apply(targets, new_map, build_start)
            .await?;
        outcome.stats.construct_time = construct_time;
        Ok(outcome)
    }

    /// The source a given absolute artifact path is derived from
    pub fn lookup_source(&self, artifact: &Path) -> Option<PathBuf> {
        let relative = artifact.strip_prefix(&self.artifact_root).ok()?;
        self.index
            .lookup_source(relative)
            .map(|source| self.source_root.join(source))
    }

    /// Every absolute artifact path derived from an absolute source path
    pub fn lookup_artifact(&self, source: &Path) -> Vec<PathBuf> {
        let Ok(relative) = source.strip_prefix(&self.source_root) else {
            return Vec::new();
        };
        self.index
            .lookup_artifact(relative)
            .iter()
            .map(|artifact| self.artifact_root.join(artifact))
            .collect()
    }

    /// The current build map
    pub fn build_map(&self) -> &BuildMap {
        &self.build_map
    }

    /// The current surviving target set
    pub fn targets(&self) -> &[BuildTarget] {
        &self.targets
    }

    async fn reconstruct_and_apply(
        &mut self,
        targets: Vec<BuildTarget>,
        normalize_time: Duration,
        build_start: Instant,
    ) -> BuildResult<BuildOutcome> {
        let construct_start = Instant::now();
        let ConstructedBuildMap { build_map, targets } =
            self.interface.construct_build_map(&targets).await?;
        let construct_time = construct_start.elapsed();

        let mut outcome = self.diff_and_apply(targets, build_map, build_start).await?;
        outcome.stats.normalize_time = normalize_time;
        outcome.stats.construct_time = construct_time;
        Ok(outcome)
    }

    async fn diff_and_apply(
        &mut self,
        targets: Vec<BuildTarget>,
        new_map: BuildMap,
        build_start: Instant,
    ) -> BuildResult<BuildOutcome> {
        let apply_start = Instant::now();
        let difference = self.build_map.difference(&new_map);
        artifacts::update(&self.source_root, &self.artifact_root, &difference).await?;
        let apply_time = apply_start.elapsed();

        let artifact_path_events = artifacts::changed_paths(&self.artifact_root, &difference);
        self.replace_state(targets.clone(), new_map);

        let stats = BuildStats {
            normalize_time: Duration::ZERO,
            construct_time: Duration::ZERO,
            apply_time,
            total_time: build_start.elapsed(),
        };
        info!(
            changed_artifacts = artifact_path_events.len(),
            total_ms = stats.total_time.as_millis() as u64,
            "incremental build finished"
        );
        Ok(BuildOutcome {
            targets,
            artifact_path_events,
            stats,
        })
    }

    fn replace_state(&mut self, targets: Vec<BuildTarget>, build_map: BuildMap) {
        self.index = build_map.index();
        self.build_map = build_map;
        self.targets = targets;
    }

    fn relativize_sources(&self, sources: &[PathBuf]) -> BuildResult<Vec<PathBuf>> {
        sources
            .iter()
            .map(|source| {
                source
                    .strip_prefix(&self.source_root)
                    .map(Path::to_path_buf)
                    .map_err(|_| BuildError::UnownedSource(source.clone()))
            })
            .collect()
    }
}

/// Lazy builder: targets are discovered on demand from the working set of
/// source paths the user is editing
pub struct LazyBuilder<I> {
    source_root: PathBuf,
    artifact_root: PathBuf,
    interface: I,
    build: BuildSection,
    build_map: BuildMap,
    index: IndexedBuildMap,
}

impl<I: LazyBuildInterface> LazyBuilder<I> {
    pub fn new(
        source_root: impl Into<PathBuf>,
        artifact_root: impl Into<PathBuf>,
        interface: I,
        build: BuildSection,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            artifact_root: artifact_root.into(),
            interface,
            build,
            build_map: BuildMap::new(),
            index: IndexedBuildMap::default(),
        }
    }

    /// Whether any path in the working set is a build recipe file.
    ///
    /// Recipe changes invalidate target discovery; callers must not feed
    /// them through [`LazyBuilder::incremental_build`]'s splicing and
    /// should rebuild the working set from scratch instead.
    pub fn working_set_contains_recipe(&self, paths: &[PathBuf]) -> bool {
        paths.iter().any(|path| self.build.is_recipe_path(path))
    }

    /// Build the targets owning `working_set` (absolute source paths) and
    /// splice the result over the current build map
    pub async fn incremental_build(&mut self, working_set: &[PathBuf]) -> BuildResult<BuildOutcome> {
        let build_start = Instant::now();

        let relative: Vec<PathBuf> = working_set
            .iter()
            .map(|source| {
                source
                    .strip_prefix(&self.source_root)
                    .map(Path::to_path_buf)
                    .map_err(|_| BuildError::UnownedSource(source.clone()))
            })
            .collect::<BuildResult<_>>()?;

        let construct_start = Instant::now();
        let constructed = self
            .interface
            .construct_build_map_for_sources(&relative)
            .await?;
        let construct_time = construct_start.elapsed();

        let working: HashSet<&Path> = relative.iter().map(PathBuf::as_path).collect();
        let mut pairs: Vec<(PathBuf, PathBuf)> = self
            .build_map
            .iter()
            .filter(|(_, source)| !working.contains(source))
            .map(|(artifact, source)| (artifact.to_path_buf(), source.to_path_buf()))
            .collect();
        pairs.extend(
            constructed
                .build_map
                .iter()
                .map(|(artifact, source)| (artifact.to_path_buf(), source.to_path_buf())),
        );
        pairs.reverse();
        let new_map = BuildMap::from_pairs_lenient(pairs);

        let apply_start = Instant::now();
        let difference = self.build_map.difference(&new_map);
        artifacts::update(&self.source_root, &self.artifact_root, &difference).await?;
        let apply_time = apply_start.elapsed();

        let artifact_path_events = artifacts::changed_paths(&self.artifact_root, &difference);
        self.index = new_map.index();
        self.build_map = new_map;

        let stats = BuildStats {
            normalize_time: Duration::ZERO,
            construct_time,
            apply_time,
            total_time: build_start.elapsed(),
        };
        info!(
            working_set = working_set.len(),
            changed_artifacts = artifact_path_events.len(),
            "lazy incremental build finished"
        );
        Ok(BuildOutcome {
            targets: Vec::new(),
            artifact_path_events,
            stats,
        })
    }

    /// Materialize a pre-existing build map without consulting the tool
    pub async fn restore(&mut self, build_map: BuildMap) -> BuildResult<()> {
        artifacts::populate(&self.source_root, &self.artifact_root, &build_map).await?;
        self.index = build_map.index();
        self.build_map = build_map;
        Ok(())
    }

    /// The current build map
    pub fn build_map(&self) -> &BuildMap {
        &self.build_map
    }

    /// The source a given absolute artifact path is derived from
    pub fn lookup_source(&self, artifact: &Path) -> Option<PathBuf> {
        let relative = artifact.strip_prefix(&self.artifact_root).ok()?;
        self.index
            .lookup_source(relative)
            .map(|source| self.source_root.join(source))
    }

    /// Every absolute artifact path derived from an absolute source path
    pub fn lookup_artifact(&self, source: &Path) -> Vec<PathBuf> {
        let Ok(relative) = source.strip_prefix(&self.source_root) else {
            return Vec::new();
        };
        self.index
            .lookup_artifact(relative)
            .iter()
            .map(|artifact| self.artifact_root.join(artifact))
            .collect()
    }
}
