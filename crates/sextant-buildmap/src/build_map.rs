//! The artifact-to-source relation
//!
//! Both sides of the map are relative paths: artifacts relative to the
//! artifact root, sources relative to the source root. Absolute resolution
//! is the caller's business. Artifact keys are unique; one source may back
//! any number of artifacts.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{
    ApplyDifferenceError, BuildMapError, DifferenceMergeError, MergeConflict,
};

/// An immutable map from artifact-relative path to source-relative path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildMap {
    entries: BTreeMap<PathBuf, PathBuf>,
}

impl BuildMap {
    /// Create an empty build map
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(artifact, source)` pairs, failing on a duplicate
    /// artifact key
    pub fn from_pairs<I, A, S>(pairs: I) -> Result<Self, BuildMapError>
    where
        I: IntoIterator<Item = (A, S)>,
        A: Into<PathBuf>,
        S: Into<PathBuf>,
    {
        let mut entries = BTreeMap::new();
        for (artifact, source) in pairs {
            let artifact = artifact.into();
            if entries.contains_key(&artifact) {
                return Err(BuildMapError::DuplicateArtifact(artifact));
            }
            entries.insert(artifact, source.into());
        }
        Ok(Self { entries })
    }

    /// Build from `(artifact, source)` pairs; on a duplicate artifact key
    /// the first binding wins
    pub fn from_pairs_lenient<I, A, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, S)>,
        A: Into<PathBuf>,
        S: Into<PathBuf>,
    {
        let mut entries = BTreeMap::new();
        for (artifact, source) in pairs {
            entries.entry(artifact.into()).or_insert_with(|| source.into());
        }
        Self { entries }
    }

    /// Parse an external `{artifact: source, …}` document.
    ///
    /// The mapping may sit at the top level or be nested under a
    /// `"sources"` container (the shape build tools emit per target).
    /// Entries whose source starts with `//` reference other cells and are
    /// skipped. Duplicate artifact keys resolve first-wins.
    pub fn from_json_value_lenient(value: &serde_json::Value) -> Result<Self, BuildMapError> {
        Ok(Self::from_pairs_lenient(Self::json_pairs(value)?))
    }

    /// Like [`BuildMap::from_json_value_lenient`], but a duplicate
    /// artifact key is an error
    pub fn from_json_value(value: &serde_json::Value) -> Result<Self, BuildMapError> {
        Self::from_pairs(Self::json_pairs(value)?)
    }

    /// Parse a JSON string; see [`BuildMap::from_json_value_lenient`]
    pub fn from_json_str_lenient(text: &str) -> Result<Self, BuildMapError> {
        Self::from_json_value_lenient(&serde_json::from_str(text)?)
    }

    fn json_pairs(value: &serde_json::Value) -> Result<Vec<(PathBuf, PathBuf)>, BuildMapError> {
        let object = value
            .as_object()
            .ok_or_else(|| BuildMapError::Shape("expected a JSON object".to_owned()))?;
        let mapping = match object.get("sources") {
            Some(nested) => nested.as_object().ok_or_else(|| {
                BuildMapError::Shape("expected 'sources' to be a JSON object".to_owned())
            })?,
            None => object,
        };
        let mut pairs = Vec::with_capacity(mapping.len());
        for (artifact, source) in mapping {
            let source = source.as_str().ok_or_else(|| {
                BuildMapError::Shape(format!("expected a string value for key '{artifact}'"))
            })?;
            if source.starts_with("//") {
                continue;
            }
            pairs.push((PathBuf::from(artifact), PathBuf::from(source)));
        }
        Ok(pairs)
    }

    /// The source a given artifact was derived from
    pub fn source_of(&self, artifact: &Path) -> Option<&Path> {
        self.entries.get(artifact).map(PathBuf::as_path)
    }

    /// Number of artifact entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(artifact, source)` pairs in artifact order
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.entries
            .iter()
            .map(|(artifact, source)| (artifact.as_path(), source.as_path()))
    }

    /// All artifact keys in order
    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Retain entries for which the predicate holds
    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&Path, &Path) -> bool,
    {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(artifact, source)| predicate(artifact, source))
                .map(|(artifact, source)| (artifact.clone(), source.clone()))
                .collect(),
        }
    }

    /// Union of two maps.
    ///
    /// Keys present on both sides are reconciled by `resolve`, which
    /// returns the chosen source or `None` to signal an unresolvable
    /// conflict; the first conflict aborts the merge and is reported with
    /// the key and both sources.
    pub fn merge<R>(&self, other: &Self, mut resolve: R) -> Result<Self, MergeConflict>
    where
        R: FnMut(&Path, &Path, &Path) -> Option<PathBuf>,
    {
        let mut entries = self.entries.clone();
        for (artifact, right_source) in &other.entries {
            match entries.get(artifact) {
                None => {
                    entries.insert(artifact.clone(), right_source.clone());
                }
                Some(left_source) if left_source == right_source => {}
                Some(left_source) => {
                    match resolve(artifact, left_source, right_source) {
                        Some(chosen) => {
                            entries.insert(artifact.clone(), chosen);
                        }
                        None => {
                            return Err(MergeConflict {
                                artifact: artifact.clone(),
                                left_source: left_source.clone(),
                                right_source: right_source.clone(),
                            })
                        }
                    }
                }
            }
        }
        Ok(Self { entries })
    }

    /// Derive the indexed bidirectional view
    pub fn index(&self) -> IndexedBuildMap {
        let mut source_of = HashMap::with_capacity(self.entries.len());
        let mut artifacts_of: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
        for (artifact, source) in &self.entries {
            source_of.insert(artifact.clone(), source.clone());
            artifacts_of
                .entry(source.clone())
                .or_default()
                .push(artifact.clone());
        }
        IndexedBuildMap {
            source_of,
            artifacts_of,
        }
    }

    /// The delta taking `self` to `current`.
    ///
    /// Artifacts only in `current` are tagged `New`, artifacts only in
    /// `self` are `Deleted`, artifacts whose source changed are `Changed`;
    /// unchanged artifacts are omitted.
    pub fn difference(&self, current: &Self) -> Difference {
        let mut entries = BTreeMap::new();
        for (artifact, source) in &current.entries {
            match self.entries.get(artifact) {
                None => {
                    entries.insert(artifact.clone(), DifferenceKind::New(source.clone()));
                }
                Some(original) if original != source => {
                    entries.insert(artifact.clone(), DifferenceKind::Changed(source.clone()));
                }
                Some(_) => {}
            }
        }
        for artifact in self.entries.keys() {
            if !current.entries.contains_key(artifact) {
                entries.insert(artifact.clone(), DifferenceKind::Deleted);
            }
        }
        Difference { entries }
    }

    /// Rebuild the map that `difference` describes, failing if the
    /// difference is inconsistent with this map
    pub fn strict_apply_difference(
        &self,
        difference: &Difference,
    ) -> Result<Self, ApplyDifferenceError> {
        let mut entries = self.entries.clone();
        for (artifact, kind) in &difference.entries {
            match kind {
                DifferenceKind::New(source) => {
                    if entries.contains_key(artifact) {
                        return Err(ApplyDifferenceError::AlreadyPresent(artifact.clone()));
                    }
                    entries.insert(artifact.clone(), source.clone());
                }
                DifferenceKind::Changed(source) => {
                    if !entries.contains_key(artifact) {
                        return Err(ApplyDifferenceError::ChangedNotPresent(artifact.clone()));
                    }
                    entries.insert(artifact.clone(), source.clone());
                }
                DifferenceKind::Deleted => {
                    if entries.remove(artifact).is_none() {
                        return Err(ApplyDifferenceError::DeletedNotPresent(artifact.clone()));
                    }
                }
            }
        }
        Ok(Self { entries })
    }

    /// Serialize as a `{artifact: source}` document for saved state
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(artifact, source)| {
                    (
                        artifact.to_string_lossy().into_owned(),
                        serde_json::Value::String(source.to_string_lossy().into_owned()),
                    )
                })
                .collect(),
        )
    }
}

/// Accept only when both sides already map the artifact to the same source
pub fn resolve_name_equal(_artifact: &Path, left: &Path, right: &Path) -> Option<PathBuf> {
    (left == right).then(|| left.to_path_buf())
}

/// Accept equal names, or distinct sources whose file contents are
/// byte-identical under `source_root` (keeping the left binding).
pub fn resolve_name_or_content_equal(
    source_root: &Path,
) -> impl FnMut(&Path, &Path, &Path) -> Option<PathBuf> + '_ {
    move |artifact, left, right| {
        if left == right {
            return Some(left.to_path_buf());
        }
        let left_contents = std::fs::read(source_root.join(left)).ok()?;
        let right_contents = std::fs::read(source_root.join(right)).ok()?;
        if left_contents == right_contents {
            debug!(
                artifact = %artifact.display(),
                kept = %left.display(),
                dropped = %right.display(),
                "sources are byte-identical, keeping the first binding"
            );
            Some(left.to_path_buf())
        } else {
            None
        }
    }
}

/// O(1) bidirectional view of a build map.
///
/// Owns its tables; stays valid after the originating map is dropped.
#[derive(Debug, Clone, Default)]
pub struct IndexedBuildMap {
    source_of: HashMap<PathBuf, PathBuf>,
    artifacts_of: HashMap<PathBuf, Vec<PathBuf>>,
}

impl IndexedBuildMap {
    /// The source a given artifact was derived from
    pub fn lookup_source(&self, artifact: &Path) -> Option<&Path> {
        self.source_of.get(artifact).map(PathBuf::as_path)
    }

    /// Every artifact derived from a given source
    pub fn lookup_artifact(&self, source: &Path) -> &[PathBuf] {
        self.artifacts_of
            .get(source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// How one artifact entry differs between two build maps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DifferenceKind {
    /// Present only in the newer map, backed by this source
    New(PathBuf),
    /// Present only in the older map
    Deleted,
    /// Present in both with a different source
    Changed(PathBuf),
}

/// The per-artifact delta between two build maps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Difference {
    entries: BTreeMap<PathBuf, DifferenceKind>,
}

impl Difference {
    /// Create an empty difference
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(artifact, kind)` pairs; later pairs overwrite earlier
    /// ones
    pub fn from_pairs<I, A>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, DifferenceKind)>,
        A: Into<PathBuf>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(artifact, kind)| (artifact.into(), kind))
                .collect(),
        }
    }

    /// Number of affected artifacts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any artifact is affected
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(artifact, kind)` in artifact order
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &DifferenceKind)> {
        self.entries
            .iter()
            .map(|(artifact, kind)| (artifact.as_path(), kind))
    }

    /// Affected artifact keys in order
    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Compose with a later difference.
    ///
    /// Composition is partial: the same artifact tagged differently on the
    /// two sides is an error carrying both tags.
    pub fn merge(&self, other: &Self) -> Result<Self, DifferenceMergeError> {
        let mut entries = self.entries.clone();
        for (artifact, right) in &other.entries {
            match entries.get(artifact) {
                None => {
                    entries.insert(artifact.clone(), right.clone());
                }
                Some(left) if left == right => {}
                Some(left) => {
                    return Err(DifferenceMergeError {
                        artifact: artifact.clone(),
                        left: left.clone(),
                        right: right.clone(),
                    })
                }
            }
        }
        Ok(Self { entries })
    }
}
