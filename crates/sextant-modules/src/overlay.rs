//! In-memory source overrides over a read-only tracker
//!
//! An overlay lets a caller (typically an editor session) shadow the
//! on-disk contents of individual modules without mutating the underlying
//! tracker. Reads check the override table first and fall through to the
//! parent on miss; the overlay remembers every qualifier it has touched
//! so routing layers can tell which overlay owns a query.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::error::CodeReadError;
use crate::events::ModuleUpdate;
use crate::module_path::ModulePath;
use crate::qualifier::Qualifier;
use crate::search_roots::SearchRoots;
use crate::tracker::{LookupResult, ModuleReader};

/// One override instruction, addressed by artifact path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeUpdate {
    /// Serve this content instead of the file
    NewCode(String),
    /// Drop the override and fall back to the file
    ResetCode,
}

/// A stack of in-memory source overrides over a read-only reader
pub struct Overlay<R> {
    parent: R,
    roots: SearchRoots,
    code: HashMap<ModulePath, String>,
    by_qualifier: HashMap<Qualifier, ModulePath>,
    owned: HashSet<Qualifier>,
}

impl<R: ModuleReader> Overlay<R> {
    /// Wrap a reader; `roots` classifies incoming artifact paths
    pub fn new(parent: R, roots: SearchRoots) -> Self {
        Self {
            parent,
            roots,
            code: HashMap::new(),
            by_qualifier: HashMap::new(),
            owned: HashSet::new(),
        }
    }

    /// Apply a batch of override instructions.
    ///
    /// Paths that do not classify as modules are ignored. Every applied
    /// instruction claims its qualifier and yields an update record so
    /// consumers re-read the module.
    pub fn update_overlaid_code(
        &mut self,
        updates: Vec<(PathBuf, CodeUpdate)>,
    ) -> Vec<ModuleUpdate> {
        let mut records = Vec::new();
        for (artifact_path, update) in updates {
            let Some(module_path) = self.roots.classify(&artifact_path) else {
                continue;
            };
            match update {
                CodeUpdate::NewCode(code) => {
                    self.code.insert(module_path.clone(), code);
                    self.by_qualifier
                        .insert(module_path.qualifier().clone(), module_path.clone());
                }
                CodeUpdate::ResetCode => {
                    self.code.remove(&module_path);
                    self.by_qualifier.remove(module_path.qualifier());
                }
            }
            self.owned.insert(module_path.qualifier().clone());
            records.push(ModuleUpdate::New(module_path));
        }
        records
    }

    /// The parent reader
    pub fn parent(&self) -> &R {
        &self.parent
    }
}

impl<R: ModuleReader> ModuleReader for Overlay<R> {
    fn look_up_qualifier(&self, qualifier: &Qualifier) -> LookupResult {
        if let Some(module_path) = self.by_qualifier.get(qualifier) {
            return LookupResult::Explicit(module_path.clone());
        }
        self.parent.look_up_qualifier(qualifier)
    }

    fn code_of_module_path(&self, module_path: &ModulePath) -> Result<String, CodeReadError> {
        if let Some(code) = self.code.get(module_path) {
            return Ok(code.clone());
        }
        self.parent.code_of_module_path(module_path)
    }

    fn owns_qualifier(&self, qualifier: &Qualifier) -> bool {
        self.owned.contains(qualifier)
    }
}
