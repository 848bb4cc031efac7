//! Artifact tree materialization
//!
//! Realizes a build map as a tree of symbolic links under the artifact
//! root, each link pointing back into the source root, and patches the
//! tree in place from a build-map difference. Assumes the build-map
//! invariant that no artifact key is a prefix of another (no path is both
//! a file and a directory), so link operations never race each other.

use std::path::{Path, PathBuf};

use futures::future::try_join_all;

use crate::build_map::{BuildMap, Difference, DifferenceKind};
use crate::error::ArtifactError;

/// Materialize `build_map` under `artifact_root`.
///
/// Creates one symlink per entry, with parent directories as needed; entry
/// order is unspecified and creation runs concurrently. Resolves only
/// after every link exists. Fails if either root is not a directory or any
/// link cannot be created (e.g. a collision with an existing file).
pub async fn populate(
    source_root: &Path,
    artifact_root: &Path,
    build_map: &BuildMap,
) -> Result<(), ArtifactError> {
    ensure_directory(source_root).await?;
    ensure_directory(artifact_root).await?;
    try_join_all(
        build_map
            .iter()
            .map(|(artifact, source)| create_link(source_root, artifact_root, artifact, source)),
    )
    .await?;
    Ok(())
}

/// Patch the artifact tree from a difference.
///
/// `New` creates a link, `Deleted` removes one, `Changed` replaces the
/// link target. Not transactional: the first failure aborts and is
/// surfaced, leaving earlier entries applied; the next build reconciles.
pub async fn update(
    source_root: &Path,
    artifact_root: &Path,
    difference: &Difference,
) -> Result<(), ArtifactError> {
    ensure_directory(source_root).await?;
    ensure_directory(artifact_root).await?;
    try_join_all(difference.iter().map(|(artifact, kind)| async move {
        match kind {
            DifferenceKind::New(source) => {
                create_link(source_root, artifact_root, artifact, source).await
            }
            DifferenceKind::Deleted => remove_link(artifact_root, artifact).await,
            DifferenceKind::Changed(source) => {
                remove_link(artifact_root, artifact).await?;
                create_link(source_root, artifact_root, artifact, source).await
            }
        }
    }))
    .await?;
    Ok(())
}

async fn ensure_directory(path: &Path) -> Result<(), ArtifactError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        _ => Err(ArtifactError::NotADirectory(path.to_path_buf())),
    }
}

async fn create_link(
    source_root: &Path,
    artifact_root: &Path,
    artifact: &Path,
    source: &Path,
) -> Result<(), ArtifactError> {
    let link_path = artifact_root.join(artifact);
    if let Some(parent) = link_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| ArtifactError::CreateDirectory {
                path: parent.to_path_buf(),
                error,
            })?;
    }
    let target = source_root.join(source);
    tokio::fs::symlink(&target, &link_path)
        .await
        .map_err(|error| ArtifactError::Link {
            path: link_path,
            error,
        })
}

async fn remove_link(artifact_root: &Path, artifact: &Path) -> Result<(), ArtifactError> {
    let link_path = artifact_root.join(artifact);
    tokio::fs::remove_file(&link_path)
        .await
        .map_err(|error| ArtifactError::Unlink {
            path: link_path,
            error,
        })
}

/// Absolute artifact paths touched by a difference, for event consumers
pub fn changed_paths(artifact_root: &Path, difference: &Difference) -> Vec<PathBuf> {
    difference
        .artifacts()
        .map(|artifact| artifact_root.join(artifact))
        .collect()
}
