//! Module discovery
//!
//! Two discovery flavors share the classification rules of
//! [`SearchRoots`]:
//! - [`find_all`] crawls every search root once and returns every module
//!   path; the eager tracker runs it at construction.
//! - [`LazyFinder`] never crawls. Given a qualifier it lists only the
//!   directories that could contain a realization of it, caching the
//!   listings per qualifier in the shared store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use sextant_store::{KeyValueTable, Store};

use crate::module_path::{ModulePath, RawModulePath};
use crate::qualifier::Qualifier;
use crate::search_roots::{SearchRoots, INIT_STEM};

/// Store namespace for the lazy finder's directory-listing cache
pub const LISTING_NAMESPACE: &str = "lazy-finder-listings";

/// Crawl every search root and return all module paths.
///
/// Directories are pruned by the directory filter; files are classified
/// by the file filter. A file reachable from several roots is attributed
/// to the first root that reaches it.
pub fn find_all(roots: &SearchRoots) -> Vec<ModulePath> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut results = Vec::new();
    for root in roots.roots() {
        let walker = WalkDir::new(&root.path)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || roots.is_valid_directory(entry.path())
            });
        for entry in walker.filter_map(Result::ok) {
            if entry.file_type().is_dir() {
                continue;
            }
            let path = entry.path();
            if !seen.insert(path.to_path_buf()) {
                continue;
            }
            if let Some(module_path) = roots.classify(path) {
                results.push(module_path);
            }
        }
    }
    debug!(modules = results.len(), "crawled search roots");
    results
}

/// One cached directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirListing {
    pub directory: PathBuf,
    pub entries: Vec<DirEntryRecord>,
}

/// One entry of a cached listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntryRecord {
    pub name: String,
    pub is_dir: bool,
}

/// On-demand finder with a per-qualifier directory-listing cache.
///
/// For qualifier `a.b.c` the candidate locations under a root are every
/// prefix split: `a/b/c.py(i)`, `a/b.c.py(i)`, `a.b.c.py(i)`, and the
/// package form `a/b/c/__init__.py(i)`, so the candidate directories are
/// the root itself, `a`, `a/b`, and `a/b/c`. Only those are ever listed.
#[derive(Debug, Clone)]
pub struct LazyFinder {
    listings: KeyValueTable<Qualifier, Vec<DirListing>>,
}

impl LazyFinder {
    pub fn new(store: &Store) -> Self {
        Self {
            listings: store.key_value_table(LISTING_NAMESPACE),
        }
    }

    /// Module paths realizing `qualifier`, best first
    pub fn find(&self, roots: &SearchRoots, qualifier: &Qualifier) -> Vec<ModulePath> {
        let parts: Vec<String> = qualifier.parts().map(str::to_owned).collect();
        let listings = self.listings_for(roots, qualifier, &parts);

        let mut found: Vec<ModulePath> = Vec::new();
        for listing in &listings {
            for entry in &listing.entries {
                if entry.is_dir {
                    continue;
                }
                let path = listing.directory.join(&entry.name);
                let Some(module_path) = roots.classify(&path) else {
                    continue;
                };
                if module_path.qualifier() == qualifier
                    && !found
                        .iter()
                        .any(|existing| existing.raw().same_location(module_path.raw()))
                {
                    found.push(module_path);
                }
            }
        }
        found.sort_by(|left, right| left.priority_cmp(right));
        found
    }

    /// Raw paths of the immediate explicit children of `qualifier`:
    /// plain module files one segment below it, and subpackages with an
    /// index file. Non-empty means the qualifier is importable as a
    /// namespace package.
    pub fn namespace_children(
        &self,
        roots: &SearchRoots,
        qualifier: &Qualifier,
    ) -> Vec<RawModulePath> {
        let parts: Vec<String> = qualifier.parts().map(str::to_owned).collect();
        let listings = self.listings_for(roots, qualifier, &parts);

        let mut children = Vec::new();
        for listing in &listings {
            let Some(depth) = listing_depth(roots, &listing.directory, parts.len()) else {
                continue;
            };
            let stem_prefix = parts[depth..].join(".");
            for entry in &listing.entries {
                if entry.is_dir {
                    // Subpackages only appear in the full-depth directory.
                    if depth == parts.len() && !entry.name.starts_with('.') {
                        for init in [format!("{INIT_STEM}.pyi"), format!("{INIT_STEM}.py")] {
                            let init_path = listing.directory.join(&entry.name).join(init);
                            if init_path.is_file() {
                                if let Some(module_path) = roots.classify(&init_path) {
                                    push_child(&mut children, module_path.raw().clone());
                                }
                                break;
                            }
                        }
                    }
                    continue;
                }
                let Some(stem) = module_file_stem(&entry.name) else {
                    continue;
                };
                let child_segment = if stem_prefix.is_empty() {
                    stem.to_owned()
                } else {
                    match stem.strip_prefix(&format!("{stem_prefix}.")) {
                        Some(rest) => rest.to_owned(),
                        None => continue,
                    }
                };
                // Exactly one extra segment makes an immediate child;
                // deeper dotted stems belong to descendant packages.
                if child_segment.is_empty()
                    || child_segment.contains('.')
                    || child_segment == INIT_STEM
                {
                    continue;
                }
                let path = listing.directory.join(&entry.name);
                if let Some(module_path) = roots.classify(&path) {
                    push_child(&mut children, module_path.raw().clone());
                }
            }
        }
        children
    }

    /// Drop cached listings for `qualifier` and every ancestor
    pub fn invalidate(&self, qualifier: &Qualifier) {
        let mut stale: Vec<Qualifier> = vec![qualifier.clone()];
        stale.extend(qualifier.ancestors());
        self.listings.remove_batch(&stale);
    }

    fn listings_for(
        &self,
        roots: &SearchRoots,
        qualifier: &Qualifier,
        parts: &[String],
    ) -> Vec<DirListing> {
        if let Some(cached) = self.listings.get(qualifier) {
            return cached;
        }
        let mut listings = Vec::new();
        for root in roots.roots() {
            for depth in 0..=parts.len() {
                let mut directory = root.path.clone();
                for part in &parts[..depth] {
                    directory.push(part);
                }
                // The root itself is always listed; only directories below
                // it are subject to the hidden/exclude filter.
                if depth > 0 && !roots.is_valid_directory(&directory) {
                    continue;
                }
                listings.push(list_directory(&directory));
            }
        }
        if let Err(error) = self.listings.add(qualifier, &listings) {
            debug!(%qualifier, %error, "failed to cache directory listings");
        }
        listings
    }
}

fn push_child(children: &mut Vec<RawModulePath>, child: RawModulePath) {
    if !children.iter().any(|existing| existing.same_location(&child)) {
        children.push(child);
    }
}

/// How many qualifier parts a candidate directory consumes, if it is one
/// of the candidate directories at all
fn listing_depth(roots: &SearchRoots, directory: &Path, max_depth: usize) -> Option<usize> {
    for root in roots.roots() {
        if let Ok(relative) = directory.strip_prefix(&root.path) {
            let depth = relative.iter().count();
            if depth <= max_depth {
                return Some(depth);
            }
        }
    }
    None
}

fn module_file_stem(name: &str) -> Option<&str> {
    name.strip_suffix(".pyi")
        .or_else(|| name.strip_suffix(".py"))
        .filter(|stem| !stem.is_empty() && !stem.starts_with('.'))
}

fn list_directory(directory: &Path) -> DirListing {
    let mut entries = Vec::new();
    if let Ok(contents) = std::fs::read_dir(directory) {
        for entry in contents.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            // Follow symlinks: the artifact tree is made of them.
            let is_dir = std::fs::metadata(entry.path())
                .map(|metadata| metadata.is_dir())
                .unwrap_or(false);
            entries.push(DirEntryRecord { name, is_dir });
        }
    }
    entries.sort_by(|left, right| left.name.cmp(&right.name));
    DirListing {
        directory: directory.to_path_buf(),
        entries,
    }
}
