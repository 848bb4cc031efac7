//! Project configuration types (sextant.toml)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult};

/// Project configuration (sextant.toml)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    pub project: ProjectSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub build: BuildSection,
}

impl ProjectConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str, file: &Path) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|error| ConfigError::TomlParse {
            file: file.to_path_buf(),
            error,
        })
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content, path)
    }
}

/// Root directory layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSection {
    /// Source tree root, relative to the project root
    pub source_root: PathBuf,
    /// Artifact (generated link tree) root, relative to the project root
    pub artifact_root: PathBuf,
}

/// Module search configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchSection {
    /// Ordered search roots; earlier roots win ties
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    /// Regex patterns for paths the trackers must never index
    #[serde(default)]
    pub excludes: Vec<String>,
}

/// Which major version of the external build tool to drive
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolVersion {
    V1,
    #[default]
    V2,
}

/// Build-tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BuildSection {
    /// Build tool major version
    #[serde(default)]
    pub tool_version: ToolVersion,
    /// Mode argument forwarded unchanged to every tool invocation
    #[serde(default)]
    pub mode: Option<String>,
    /// Isolation prefix forwarded unchanged to every tool invocation
    #[serde(default)]
    pub isolation_prefix: Option<String>,
    /// Discover targets on demand from the working set instead of up front
    #[serde(default)]
    pub lazy: bool,
    /// Target patterns to normalize and build
    #[serde(default)]
    pub targets: Vec<String>,
    /// File names whose changes invalidate target discovery (build recipe
    /// files); a change to one of these disqualifies fast incremental
    /// rebuilds
    #[serde(default = "default_recipe_names")]
    pub recipes: Vec<String>,
}

fn default_recipe_names() -> Vec<String> {
    vec!["BUILD".to_owned(), "TARGETS".to_owned()]
}

impl BuildSection {
    /// Whether `path` names a build recipe file
    pub fn is_recipe_path(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.recipes.iter().any(|recipe| recipe == name))
    }
}
