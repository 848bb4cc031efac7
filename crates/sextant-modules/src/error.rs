/// Module tracker error types
use std::path::PathBuf;

use thiserror::Error;

/// Fatal tracker failures.
///
/// An invariant violation means the update stream contradicted the table
/// state; it indicates a bug upstream and is never recovered.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure to read a module's backing file
#[derive(Debug, Error)]
pub enum CodeReadError {
    #[error("failed to read {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}
