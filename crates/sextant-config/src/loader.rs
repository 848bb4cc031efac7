//! Configuration loader
//!
//! Discovers sextant.toml by walking up from a start directory and applies
//! environment overrides with proper precedence:
//! 1. Project config (sextant.toml) - lowest
//! 2. Environment variables (SEXTANT_*) - highest

use std::env;
use std::path::{Path, PathBuf};

use crate::project::ProjectConfig;
use crate::{ConfigError, ConfigResult, ToolVersion};

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "sextant.toml";

/// Loaded configuration with its discovered project root
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration after overrides
    pub project: ProjectConfig,
    /// Directory containing the configuration file
    pub project_root: PathBuf,
}

impl Config {
    /// Absolute source root
    pub fn source_root(&self) -> PathBuf {
        self.project_root.join(&self.project.project.source_root)
    }

    /// Absolute artifact root
    pub fn artifact_root(&self) -> PathBuf {
        self.project_root.join(&self.project.project.artifact_root)
    }

    /// Absolute search roots, in priority order
    pub fn search_roots(&self) -> Vec<PathBuf> {
        self.project
            .search
            .roots
            .iter()
            .map(|root| self.project_root.join(root))
            .collect()
    }
}

/// Configuration loader
#[derive(Debug, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self
    }

    /// Load configuration starting from the given directory.
    ///
    /// Walks up the directory tree to find sextant.toml, then applies
    /// environment overrides.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, config_path) = self.find_config_file(start_dir)?;
        let project = ProjectConfig::load_from_file(&config_path)?;
        let project = self.apply_env_overrides(project)?;
        Ok(Config {
            project,
            project_root,
        })
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let project = ProjectConfig::load_from_file(config_path)?;
        let project = self.apply_env_overrides(project)?;
        let project_root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Config {
            project,
            project_root,
        })
    }

    fn find_config_file(&self, start_dir: &Path) -> ConfigResult<(PathBuf, PathBuf)> {
        let mut current = start_dir.to_path_buf();
        loop {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Ok((current, candidate));
            }
            if !current.pop() {
                return Err(ConfigError::NotFound(start_dir.to_path_buf()));
            }
        }
    }

    fn apply_env_overrides(&self, mut project: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(mode) = env::var("SEXTANT_MODE") {
            project.build.mode = Some(mode);
        }
        if let Ok(prefix) = env::var("SEXTANT_ISOLATION_PREFIX") {
            project.build.isolation_prefix = Some(prefix);
        }
        if let Ok(lazy) = env::var("SEXTANT_LAZY") {
            project.build.lazy = parse_bool("SEXTANT_LAZY", &lazy)?;
        }
        if let Ok(version) = env::var("SEXTANT_TOOL_VERSION") {
            project.build.tool_version = match version.as_str() {
                "v1" => ToolVersion::V1,
                "v2" => ToolVersion::V2,
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: "SEXTANT_TOOL_VERSION".to_owned(),
                        reason: format!("expected 'v1' or 'v2', got '{other}'"),
                    })
                }
            };
        }
        Ok(project)
    }
}

fn parse_bool(field: &str, value: &str) -> ConfigResult<bool> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field: field.to_owned(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[project]
source_root = "src"
artifact_root = "out"
"#;

    #[test]
    fn test_load_from_directory_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), MINIMAL).unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let config = ConfigLoader::new().load_from_directory(&nested).unwrap();
        assert_eq!(config.project_root, dir.path());
        assert_eq!(config.source_root(), dir.path().join("src"));
        assert_eq!(config.artifact_root(), dir.path().join("out"));
    }

    #[test]
    fn test_load_from_directory_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::new().load_from_directory(dir.path());
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_search_roots_are_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let config_text = r#"
[project]
source_root = "src"
artifact_root = "out"

[search]
roots = ["out", "stubs"]
"#;
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), config_text).unwrap();

        let config = ConfigLoader::new().load_from_directory(dir.path()).unwrap();
        assert_eq!(
            config.search_roots(),
            vec![dir.path().join("out"), dir.path().join("stubs")]
        );
    }

    #[test]
    fn test_parse_bool_values() {
        assert!(parse_bool("F", "true").unwrap());
        assert!(parse_bool("F", "1").unwrap());
        assert!(!parse_bool("F", "false").unwrap());
        assert!(parse_bool("F", "maybe").is_err());
    }
}
