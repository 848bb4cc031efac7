//! Ordered search roots and path classification
//!
//! Search roots are the directories modules are looked up in, in priority
//! order. Classification turns an absolute file path into a
//! [`ModulePath`]: find the owning root, relativize, derive the
//! qualifier, and reject candidates that can never be modules (hidden
//! files, foreign suffixes, excluded paths).

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::module_path::{ModulePath, RawModulePath};
use crate::qualifier::Qualifier;

/// Source file suffixes, stubs first
const MODULE_SUFFIXES: [&str; 2] = ["pyi", "py"];

/// Name of a package index file, without suffix
pub const INIT_STEM: &str = "__init__";

/// One search root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoot {
    /// Absolute directory path
    pub path: PathBuf,
    /// Whether files under this root are type checked (dependency roots
    /// are indexed only)
    pub should_type_check: bool,
}

impl SearchRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            should_type_check: true,
        }
    }

    pub fn dependency(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            should_type_check: false,
        }
    }
}

/// The ordered root set with its exclude patterns
#[derive(Debug, Clone)]
pub struct SearchRoots {
    roots: Vec<SearchRoot>,
    excludes: Vec<Regex>,
}

impl SearchRoots {
    pub fn new(roots: Vec<SearchRoot>, exclude_patterns: &[String]) -> Result<Self, regex::Error> {
        let excludes = exclude_patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<_, _>>()?;
        Ok(Self { roots, excludes })
    }

    /// All-type-checked roots with no excludes
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: paths.into_iter().map(SearchRoot::new).collect(),
            excludes: Vec::new(),
        }
    }

    pub fn roots(&self) -> &[SearchRoot] {
        &self.roots
    }

    /// The absolute path a raw module path denotes
    pub fn absolute_path(&self, raw: &RawModulePath) -> PathBuf {
        match self.roots.get(raw.root_index) {
            Some(root) => root.path.join(&raw.relative),
            None => raw.relative.clone(),
        }
    }

    /// Classify an absolute path as a module, or reject it.
    ///
    /// The owning root is the one with the longest matching prefix,
    /// earliest listed on ties.
    pub fn classify(&self, path: &Path) -> Option<ModulePath> {
        let (root_index, relative) = self.owning_root(path)?;
        if !self.is_valid_relative_path(path, &relative) {
            return None;
        }

        let stem = relative.file_stem()?.to_str()?;
        let suffix = relative.extension()?.to_str()?;
        let is_stub = suffix == "pyi";
        let is_init = stem == INIT_STEM;

        let mut parts: Vec<&str> = relative
            .parent()
            .into_iter()
            .flat_map(|parent| parent.iter())
            .filter_map(|component| component.to_str())
            .collect();
        if !is_init {
            parts.push(stem);
        }
        let qualifier = Qualifier::from_parts(parts);

        let raw = RawModulePath {
            root_index,
            relative,
            should_type_check: self.roots[root_index].should_type_check,
        };
        Some(ModulePath::new(raw, qualifier, is_stub, is_init))
    }

    /// Whether a path would be accepted as a module file were it to exist
    pub fn is_valid_file(&self, path: &Path) -> bool {
        match self.owning_root(path) {
            Some((_, relative)) => self.is_valid_relative_path(path, &relative),
            None => false,
        }
    }

    /// Whether a directory may contain modules (crawl filter)
    pub fn is_valid_directory(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        !hidden && !self.is_excluded(path)
    }

    fn owning_root(&self, path: &Path) -> Option<(usize, PathBuf)> {
        self.roots
            .iter()
            .enumerate()
            .filter_map(|(index, root)| {
                path.strip_prefix(&root.path)
                    .ok()
                    .map(|relative| (index, root.path.as_os_str().len(), relative.to_path_buf()))
            })
            // Longest prefix wins, earliest root on ties.
            .min_by_key(|(index, root_len, _)| (std::cmp::Reverse(*root_len), *index))
            .map(|(index, _, relative)| (index, relative))
    }

    fn is_valid_relative_path(&self, absolute: &Path, relative: &Path) -> bool {
        let has_module_suffix = relative
            .extension()
            .and_then(|suffix| suffix.to_str())
            .is_some_and(|suffix| MODULE_SUFFIXES.contains(&suffix));
        let hidden = relative
            .iter()
            .filter_map(|component| component.to_str())
            .any(|component| component.starts_with('.'));
        has_module_suffix
            && !hidden
            && relative.file_stem().is_some()
            && !self.is_excluded(absolute)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let Some(path) = path.to_str() else {
            return true;
        };
        self.excludes.iter().any(|pattern| pattern.is_match(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn roots() -> SearchRoots {
        SearchRoots::new(
            vec![
                SearchRoot::new("/stubs"),
                SearchRoot::new("/project"),
                SearchRoot::dependency("/project/vendored"),
            ],
            &[".*/experimental/.*".to_owned()],
        )
        .unwrap()
    }

    #[test]
    fn test_classify_plain_module() {
        let module = roots().classify(Path::new("/project/pkg/mod.py")).unwrap();
        assert_eq!(module.qualifier(), &Qualifier::from_dotted("pkg.mod"));
        assert_eq!(module.raw().root_index, 1);
        assert_eq!(module.raw().relative, PathBuf::from("pkg/mod.py"));
        assert!(module.raw().should_type_check);
        assert!(!module.is_stub());
        assert!(!module.is_init());
    }

    #[test]
    fn test_classify_init_collapses_to_package() {
        let module = roots()
            .classify(Path::new("/project/pkg/__init__.py"))
            .unwrap();
        assert_eq!(module.qualifier(), &Qualifier::from_dotted("pkg"));
        assert!(module.is_init());
    }

    #[test]
    fn test_classify_stub() {
        let module = roots().classify(Path::new("/stubs/pkg/mod.pyi")).unwrap();
        assert!(module.is_stub());
        assert_eq!(module.raw().root_index, 0);
    }

    #[test]
    fn test_classify_dotted_file_name() {
        let module = roots().classify(Path::new("/project/a/b.c.py")).unwrap();
        assert_eq!(module.qualifier(), &Qualifier::from_dotted("a.b.c"));
    }

    #[test]
    fn test_classify_longest_prefix_wins() {
        let module = roots()
            .classify(Path::new("/project/vendored/lib.py"))
            .unwrap();
        assert_eq!(module.raw().root_index, 2);
        assert!(!module.raw().should_type_check);
        assert_eq!(module.qualifier(), &Qualifier::from_dotted("lib"));
    }

    #[test]
    fn test_classify_rejects_foreign_suffix() {
        assert!(roots().classify(Path::new("/project/notes.txt")).is_none());
        assert!(roots().classify(Path::new("/project/pkg/data.json")).is_none());
    }

    #[test]
    fn test_classify_rejects_hidden_components() {
        assert!(roots().classify(Path::new("/project/.hidden.py")).is_none());
        assert!(roots()
            .classify(Path::new("/project/.venv/lib/mod.py"))
            .is_none());
    }

    #[test]
    fn test_classify_rejects_excluded_paths() {
        assert!(roots()
            .classify(Path::new("/project/pkg/experimental/mod.py"))
            .is_none());
    }

    #[test]
    fn test_classify_rejects_unowned_path() {
        assert!(roots().classify(Path::new("/elsewhere/mod.py")).is_none());
    }

    #[test]
    fn test_is_valid_directory() {
        let roots = roots();
        assert!(roots.is_valid_directory(Path::new("/project/pkg")));
        assert!(!roots.is_valid_directory(Path::new("/project/.git")));
        assert!(!roots.is_valid_directory(Path::new("/project/pkg/experimental/sub")));
    }

    #[test]
    fn test_absolute_path() {
        let raw = RawModulePath {
            root_index: 1,
            relative: PathBuf::from("pkg/mod.py"),
            should_type_check: true,
        };
        assert_eq!(
            roots().absolute_path(&raw),
            PathBuf::from("/project/pkg/mod.py")
        );
    }
}
