/// Build map error types
use std::path::PathBuf;

use thiserror::Error;

use crate::build_map::DifferenceKind;

/// Errors constructing a build map
#[derive(Debug, Error)]
pub enum BuildMapError {
    #[error("duplicate artifact path {0} in build map")]
    DuplicateArtifact(PathBuf),

    #[error("malformed build map document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected build map document shape: {0}")]
    Shape(String),
}

/// Two build maps disagree on where an artifact comes from.
///
/// Carries both sides so the caller can log a reproducible report before
/// deciding which target to drop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("artifact {artifact} maps to both {left_source} and {right_source}")]
pub struct MergeConflict {
    pub artifact: PathBuf,
    pub left_source: PathBuf,
    pub right_source: PathBuf,
}

/// Two differences assign contradictory tags to the same artifact
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("difference entries for {artifact} contradict each other")]
pub struct DifferenceMergeError {
    pub artifact: PathBuf,
    pub left: DifferenceKind,
    pub right: DifferenceKind,
}

/// A difference is inconsistent with the build map it is applied to
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyDifferenceError {
    #[error("cannot add {0}: artifact already present")]
    AlreadyPresent(PathBuf),

    #[error("cannot update {0}: artifact not present")]
    ChangedNotPresent(PathBuf),

    #[error("cannot delete {0}: artifact not present")]
    DeletedNotPresent(PathBuf),
}

/// Filesystem failures while materializing or patching the artifact tree.
///
/// Always returned as a value; artifact operations never panic on I/O.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("failed to create directory {path}: {error}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("failed to create link {path}: {error}")]
    Link {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("failed to remove link {path}: {error}")]
    Unlink {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}
