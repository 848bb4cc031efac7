//! Build map infrastructure
//!
//! A build map is the relation between the artifact tree handed to
//! analysis and the source tree the user edits. External build tools
//! relocate sources into an artifact layout of their own choosing; the
//! build map records, for every artifact-relative path, the
//! source-relative path it was derived from.
//!
//! This crate provides:
//! - [`BuildMap`]: the immutable relation with merge, filter, and
//!   difference operations
//! - [`IndexedBuildMap`]: O(1) bidirectional lookup
//! - [`Difference`]: the delta between two build maps, composable and
//!   strictly applicable
//! - [`artifacts`]: materialization of a build map as a tree of symbolic
//!   links, and in-place patching from a difference

pub mod artifacts;
pub mod build_map;
pub mod error;

pub use artifacts::{populate, update};
pub use build_map::{
    resolve_name_equal, resolve_name_or_content_equal, BuildMap, Difference, DifferenceKind,
    IndexedBuildMap,
};
pub use error::{
    ApplyDifferenceError, ArtifactError, BuildMapError, DifferenceMergeError, MergeConflict,
};
