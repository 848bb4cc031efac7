//! Canonical handles to module files
//!
//! A [`ModulePath`] names one file realizing a qualifier: which search
//! root it lives under, its path relative to that root, and the derived
//! properties that decide precedence when several files realize the same
//! qualifier.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::qualifier::Qualifier;

/// The identity of a module file: search root, relative path, and whether
/// the analyzer should type check it (dependency roots are indexed but not
/// checked).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawModulePath {
    pub root_index: usize,
    pub relative: std::path::PathBuf,
    pub should_type_check: bool,
}

impl RawModulePath {
    /// Whether two raw paths name the same file, ignoring the
    /// `should_type_check` flag.
    ///
    /// Removal tolerates a flag mismatch against the stored entry: a
    /// deleted symlink can no longer be classified, so the event may carry
    /// a different flag than the insertion did.
    pub fn same_location(&self, other: &RawModulePath) -> bool {
        self.root_index == other.root_index && self.relative == other.relative
    }
}

/// A logical handle to one module file.
///
/// Equality and hashing consider only the raw triple; the remaining fields
/// are derived from it.
#[derive(Debug, Clone)]
pub struct ModulePath {
    raw: RawModulePath,
    qualifier: Qualifier,
    is_stub: bool,
    is_init: bool,
}

impl ModulePath {
    pub fn new(raw: RawModulePath, qualifier: Qualifier, is_stub: bool, is_init: bool) -> Self {
        Self {
            raw,
            qualifier,
            is_stub,
            is_init,
        }
    }

    pub fn raw(&self) -> &RawModulePath {
        &self.raw
    }

    pub fn qualifier(&self) -> &Qualifier {
        &self.qualifier
    }

    /// Whether the file is a stub (`.pyi`)
    pub fn is_stub(&self) -> bool {
        self.is_stub
    }

    /// Whether the file is a package index (`__init__`)
    pub fn is_init(&self) -> bool {
        self.is_init
    }

    /// Total order among module paths sharing a qualifier; the minimum
    /// wins. Stubs shadow implementations, then shorter relative paths,
    /// then earlier search roots.
    pub fn priority_cmp(&self, other: &ModulePath) -> Ordering {
        other
            .is_stub
            .cmp(&self.is_stub)
            .then_with(|| {
                self.raw
                    .relative
                    .as_os_str()
                    .len()
                    .cmp(&other.raw.relative.as_os_str().len())
            })
            .then_with(|| self.raw.root_index.cmp(&other.raw.root_index))
            .then_with(|| self.raw.relative.cmp(&other.raw.relative))
    }
}

impl PartialEq for ModulePath {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for ModulePath {}

impl Hash for ModulePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn module_path(root_index: usize, relative: &str, is_stub: bool) -> ModulePath {
        ModulePath::new(
            RawModulePath {
                root_index,
                relative: PathBuf::from(relative),
                should_type_check: true,
            },
            Qualifier::from_dotted("a"),
            is_stub,
            false,
        )
    }

    #[test]
    fn test_stub_beats_implementation_regardless_of_root() {
        let implementation = module_path(0, "a.py", false);
        let stub = module_path(1, "a.pyi", true);
        assert_eq!(stub.priority_cmp(&implementation), Ordering::Less);
        assert_eq!(implementation.priority_cmp(&stub), Ordering::Greater);
    }

    #[test]
    fn test_shorter_relative_path_wins() {
        let short = module_path(1, "a.py", false);
        let long = module_path(0, "deep/a.py", false);
        assert_eq!(short.priority_cmp(&long), Ordering::Less);
    }

    #[test]
    fn test_earlier_root_breaks_ties() {
        let first = module_path(0, "a.py", false);
        let second = module_path(1, "a.py", false);
        assert_eq!(first.priority_cmp(&second), Ordering::Less);
    }

    #[test]
    fn test_equality_ignores_derived_fields() {
        let raw = RawModulePath {
            root_index: 0,
            relative: PathBuf::from("a.py"),
            should_type_check: true,
        };
        let left = ModulePath::new(raw.clone(), Qualifier::from_dotted("a"), false, false);
        let right = ModulePath::new(raw, Qualifier::from_dotted("other"), true, true);
        assert_eq!(left, right);
    }

    #[test]
    fn test_same_location_ignores_flag() {
        let checked = RawModulePath {
            root_index: 0,
            relative: PathBuf::from("a.py"),
            should_type_check: true,
        };
        let unchecked = RawModulePath {
            should_type_check: false,
            ..checked.clone()
        };
        assert!(checked.same_location(&unchecked));
        assert_ne!(checked, unchecked);
    }
}
