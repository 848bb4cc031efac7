//! Sextant configuration system
//!
//! Provides project configuration (sextant.toml) for the build and
//! module-tracking subsystem:
//! - source and artifact root locations
//! - ordered module search roots and exclude patterns
//! - build-tool knobs (tool version, mode, isolation prefix, laziness,
//!   target patterns, recipe filenames)
//!
//! Configuration is loaded from the project file and overridden by
//! `SEXTANT_*` environment variables.

pub mod loader;
pub mod project;

use std::path::PathBuf;

use thiserror::Error;

pub use loader::ConfigLoader;
pub use project::{BuildSection, ProjectConfig, ProjectSection, SearchSection, ToolVersion};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found under {0}")]
    NotFound(PathBuf),

    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML syntax in {file}: {error}")]
    TomlParse {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
