/// Build orchestration error types
use std::path::PathBuf;

use thiserror::Error;

use crate::raw::ToolError;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("failed to parse build tool output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed build map in source database: {0}")]
    Map(#[from] sextant_buildmap::BuildMapError),

    #[error(transparent)]
    Artifact(#[from] sextant_buildmap::ArtifactError),

    #[error("inconsistent build map difference: {0}")]
    ApplyDifference(#[from] sextant_buildmap::ApplyDifferenceError),

    #[error("I/O error at {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("path {0} is not under the source root")]
    UnownedSource(PathBuf),
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }
}
