//! Module tracking
//!
//! The tracker owns two tables keyed by qualifier:
//! - *Explicit*: qualifier → non-empty priority-ordered list of module
//!   paths; the head is the file analysis sees.
//! - *Implicit*: qualifier → raw paths of its immediate explicit
//!   children; non-empty means the qualifier is importable as a namespace
//!   package.
//!
//! Writes are serialized through [`ModuleTracker::process_events`]
//! (single writer); readers take a [`ReadOnlyView`] and observe either
//! the pre-update or post-update tables. The eager flavor fills the
//! tables by crawling once at construction; the lazy flavor fills them on
//! first lookup and deliberately ignores events for qualifiers nobody has
//! asked about.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::{debug, info};

use sextant_store::Store;

use crate::error::{CodeReadError, TrackerError};
use crate::events::{FileEvent, FileEventKind, ModulePathUpdate, ModuleUpdate};
use crate::finder::{find_all, LazyFinder};
use crate::module_path::{ModulePath, RawModulePath};
use crate::qualifier::Qualifier;
use crate::search_roots::SearchRoots;

/// What a qualifier resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    /// Backed by a file; the winning module path
    Explicit(ModulePath),
    /// A namespace package with at least one explicit child
    Implicit,
    /// Unknown to the tracker
    NotFound,
}

/// Discovery flavor, selected by a controls flag at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracking {
    Eager,
    Lazy,
}

/// Read access shared by trackers and overlays
pub trait ModuleReader {
    fn look_up_qualifier(&self, qualifier: &Qualifier) -> LookupResult;

    fn code_of_module_path(&self, module_path: &ModulePath) -> Result<String, CodeReadError>;

    /// Whether this reader has layered its own claim on the qualifier
    fn owns_qualifier(&self, _qualifier: &Qualifier) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct Tables {
    explicit: BTreeMap<Qualifier, Vec<ModulePath>>,
    implicit: BTreeMap<Qualifier, Vec<RawModulePath>>,
}

impl Tables {
    fn lookup(&self, qualifier: &Qualifier) -> LookupResult {
        if let Some(list) = self.explicit.get(qualifier) {
            if let Some(head) = list.first() {
                return LookupResult::Explicit(head.clone());
            }
        }
        match self.implicit.get(qualifier) {
            Some(children) if !children.is_empty() => LookupResult::Implicit,
            _ => LookupResult::NotFound,
        }
    }

    fn is_importable_namespace(&self, qualifier: &Qualifier) -> bool {
        self.implicit
            .get(qualifier)
            .is_some_and(|children| !children.is_empty())
    }

    /// Insert or refresh a module path, returning the observable update
    fn insert_module(&mut self, module_path: ModulePath) -> Option<ModuleUpdate> {
        let qualifier = module_path.qualifier().clone();
        match self.explicit.entry(qualifier) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(vec![module_path.clone()]);
                Some(ModuleUpdate::New(module_path))
            }
            std::collections::btree_map::Entry::Occupied(entry) => {
                let list = entry.into_mut();
                if let Some(position) = list
                    .iter()
                    .position(|existing| existing.raw().same_location(module_path.raw()))
                {
                    list.remove(position);
                }
                let position = list
                    .iter()
                    .position(|existing| {
                        module_path.priority_cmp(existing) == std::cmp::Ordering::Less
                    })
                    .unwrap_or(list.len());
                list.insert(position, module_path.clone());
                if position == 0 {
                    Some(ModuleUpdate::Changed(module_path))
                } else {
                    // A shadowed file changed; no observable effect.
                    None
                }
            }
        }
    }

    /// Remove a module path, returning the observable update
    fn remove_module(&mut self, module_path: &ModulePath) -> Option<ModuleUpdate> {
        let qualifier = module_path.qualifier();
        let list = self.explicit.get_mut(qualifier)?;
        let position = list
            .iter()
            .position(|existing| existing.raw().same_location(module_path.raw()))?;
        if list[position].raw().should_type_check != module_path.raw().should_type_check {
            debug!(
                %qualifier,
                "removing a module path whose type-check flag differs from the stored entry"
            );
        }
        list.remove(position);
        if list.is_empty() {
            self.explicit.remove(qualifier);
            Some(ModuleUpdate::Delete(qualifier.clone()))
        } else if position == 0 {
            Some(ModuleUpdate::Changed(list[0].clone()))
        } else {
            None
        }
    }

    fn add_implicit_child(&mut self, parent: Qualifier, child: RawModulePath) {
        let children = self.implicit.entry(parent).or_default();
        if !children.iter().any(|existing| existing.same_location(&child)) {
            children.push(child);
        }
    }

    fn remove_implicit_child(&mut self, parent: &Qualifier, child: &RawModulePath) {
        if let Some(children) = self.implicit.get_mut(parent) {
            children.retain(|existing| !existing.same_location(child));
            if children.is_empty() {
                self.implicit.remove(parent);
            }
        }
    }
}

/// Strategy object implementing the eager/lazy split
trait TrackingStrategy: Send + Sync {
    /// Fill the tables enough to answer a lookup for `qualifier`
    fn prepare_lookup(&self, roots: &SearchRoots, tables: &RwLock<Tables>, qualifier: &Qualifier);

    /// Whether an event for `qualifier` carries no information for the
    /// tables
    fn should_skip_update(&self, qualifier: &Qualifier) -> bool;

    /// React to a filesystem event for `qualifier` (cache invalidation)
    fn invalidate(&self, qualifier: &Qualifier);
}

/// Everything is discovered at construction; lookups read the tables as
/// they are.
struct EagerStrategy;

impl TrackingStrategy for EagerStrategy {
    fn prepare_lookup(&self, _roots: &SearchRoots, _tables: &RwLock<Tables>, _qualifier: &Qualifier) {}

    fn should_skip_update(&self, _qualifier: &Qualifier) -> bool {
        false
    }

    fn invalidate(&self, _qualifier: &Qualifier) {}
}

/// Nothing is discovered up front; the first lookup of a qualifier runs
/// the lazy finder and the result is remembered.
struct LazyStrategy {
    finder: LazyFinder,
    asked: RwLock<HashSet<Qualifier>>,
}

impl TrackingStrategy for LazyStrategy {
    fn prepare_lookup(&self, roots: &SearchRoots, tables: &RwLock<Tables>, qualifier: &Qualifier) {
        if self
            .asked
            .read()
            .expect("tracker lock poisoned")
            .contains(qualifier)
        {
            return;
        }
        let found = self.finder.find(roots, qualifier);
        let children = self.finder.namespace_children(roots, qualifier);
        {
            let mut tables = tables.write().expect("tracker lock poisoned");
            if !found.is_empty() {
                tables.explicit.insert(qualifier.clone(), found);
            }
            if !children.is_empty() {
                tables.implicit.insert(qualifier.clone(), children);
            }
        }
        self.asked
            .write()
            .expect("tracker lock poisoned")
            .insert(qualifier.clone());
    }

    fn should_skip_update(&self, qualifier: &Qualifier) -> bool {
        !self
            .asked
            .read()
            .expect("tracker lock poisoned")
            .contains(qualifier)
    }

    fn invalidate(&self, qualifier: &Qualifier) {
        self.finder.invalidate(qualifier);
    }
}

/// The module tracker; see the module documentation
pub struct ModuleTracker {
    roots: SearchRoots,
    tables: RwLock<Tables>,
    strategy: Box<dyn TrackingStrategy>,
    in_memory_sources: HashMap<(usize, PathBuf), String>,
}

impl ModuleTracker {
    /// Construct with the flavor chosen by `tracking`
    pub fn new(roots: SearchRoots, tracking: Tracking, store: &Store) -> Self {
        match tracking {
            Tracking::Eager => Self::eager(roots),
            Tracking::Lazy => Self::lazy(roots, store),
        }
    }

    /// Eager tracker: crawl every search root once, now
    pub fn eager(roots: SearchRoots) -> Self {
        let mut tables = Tables::default();
        let modules = find_all(&roots);
        info!(modules = modules.len(), "bootstrapped module tables");
        for module_path in modules {
            let parent = non_root_parent(module_path.qualifier());
            let raw = module_path.raw().clone();
            tables.insert_module(module_path);
            if let Some(parent) = parent {
                tables.add_implicit_child(parent, raw);
            }
        }
        Self {
            roots,
            tables: RwLock::new(tables),
            strategy: Box::new(EagerStrategy),
            in_memory_sources: HashMap::new(),
        }
    }

    /// Lazy tracker: discover on demand, caching directory listings in
    /// the shared store
    pub fn lazy(roots: SearchRoots, store: &Store) -> Self {
        Self {
            roots,
            tables: RwLock::new(Tables::default()),
            strategy: Box::new(LazyStrategy {
                finder: LazyFinder::new(store),
                asked: RwLock::new(HashSet::new()),
            }),
            in_memory_sources: HashMap::new(),
        }
    }

    /// Register in-memory contents served instead of the backing file
    pub fn with_in_memory_sources<I>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = (RawModulePath, String)>,
    {
        self.in_memory_sources = sources
            .into_iter()
            .map(|(raw, code)| ((raw.root_index, raw.relative), code))
            .collect();
        self
    }

    /// The search roots this tracker classifies against
    pub fn search_roots(&self) -> &SearchRoots {
        &self.roots
    }

    /// Resolve a qualifier
    pub fn look_up_qualifier(&self, qualifier: &Qualifier) -> LookupResult {
        self.strategy
            .prepare_lookup(&self.roots, &self.tables, qualifier);
        self.tables
            .read()
            .expect("tracker lock poisoned")
            .lookup(qualifier)
    }

    /// The contents of a module's backing file, or its registered
    /// in-memory override
    pub fn code_of_module_path(&self, module_path: &ModulePath) -> Result<String, CodeReadError> {
        let raw = module_path.raw();
        if let Some(code) = self
            .in_memory_sources
            .get(&(raw.root_index, raw.relative.clone()))
        {
            return Ok(code.clone());
        }
        let path = self.roots.absolute_path(raw);
        std::fs::read_to_string(&path).map_err(|error| CodeReadError::Io { path, error })
    }

    /// Every explicitly tracked qualifier, in order
    pub fn all_qualifiers(&self) -> Vec<Qualifier> {
        self.tables
            .read()
            .expect("tracker lock poisoned")
            .explicit
            .keys()
            .cloned()
            .collect()
    }

    /// A snapshot view for concurrent readers
    pub fn read_only(&self) -> ReadOnlyView<'_> {
        ReadOnlyView { tracker: self }
    }

    /// Apply a batch of filesystem events and return the net module
    /// update per affected qualifier: explicit updates first (in
    /// first-event order), then namespace-package transitions.
    pub fn process_events(
        &mut self,
        events: Vec<FileEvent>,
    ) -> Result<Vec<ModuleUpdate>, TrackerError> {
        let mut explicit_updates: Vec<ModuleUpdate> = Vec::new();
        let mut implicit_touched: Vec<Qualifier> = Vec::new();
        let mut implicit_initial: HashMap<Qualifier, bool> = HashMap::new();

        let tables = self.tables.get_mut().expect("tracker lock poisoned");
        for event in events {
            let Some(module_path) = self.roots.classify(&event.path) else {
                continue;
            };
            let qualifier = module_path.qualifier().clone();
            self.strategy.invalidate(&qualifier);
            if self.strategy.should_skip_update(&qualifier) {
                continue;
            }
            let update = match event.kind {
                FileEventKind::CreatedOrChanged => ModulePathUpdate::NewOrChanged(module_path),
                FileEventKind::Removed => ModulePathUpdate::Remove(module_path),
            };
            let parent = non_root_parent(&qualifier);
            if let Some(parent) = &parent {
                implicit_initial
                    .entry(parent.clone())
                    .or_insert_with(|| {
                        implicit_touched.push(parent.clone());
                        tables.is_importable_namespace(parent)
                    });
            }
            match update {
                ModulePathUpdate::NewOrChanged(module_path) => {
                    let raw = module_path.raw().clone();
                    if let Some(update) = tables.insert_module(module_path) {
                        explicit_updates.push(update);
                    }
                    if let Some(parent) = parent {
                        tables.add_implicit_child(parent, raw);
                    }
                }
                ModulePathUpdate::Remove(module_path) => {
                    if let Some(update) = tables.remove_module(&module_path) {
                        explicit_updates.push(update);
                    }
                    if let Some(parent) = parent {
                        tables.remove_implicit_child(&parent, module_path.raw());
                    }
                }
            }
        }

        let mut updates = fold_explicit_updates(explicit_updates)?;
        let explicit_qualifiers: HashSet<Qualifier> =
            updates.iter().map(|update| update.qualifier().clone()).collect();
        for parent in implicit_touched {
            if explicit_qualifiers.contains(&parent) {
                // The qualifier already has an explicit event this batch.
                continue;
            }
            if self.strategy.should_skip_update(&parent) {
                continue;
            }
            let was_importable = implicit_initial[&parent];
            let is_importable = tables.is_importable_namespace(&parent);
            match (was_importable, is_importable) {
                (false, true) => updates.push(ModuleUpdate::NewImplicit(parent)),
                (true, false) => updates.push(ModuleUpdate::Delete(parent)),
                _ => {}
            }
        }
        Ok(updates)
    }
}

/// Borrowing snapshot of a tracker, safe to consult from many readers
/// between writer batches
pub struct ReadOnlyView<'a> {
    tracker: &'a ModuleTracker,
}

impl ModuleReader for ReadOnlyView<'_> {
    fn look_up_qualifier(&self, qualifier: &Qualifier) -> LookupResult {
        self.tracker.look_up_qualifier(qualifier)
    }

    fn code_of_module_path(&self, module_path: &ModulePath) -> Result<String, CodeReadError> {
        self.tracker.code_of_module_path(module_path)
    }
}

fn non_root_parent(qualifier: &Qualifier) -> Option<Qualifier> {
    qualifier.parent().filter(|parent| !parent.is_root())
}

/// Fold a batch's explicit updates down to one net update per qualifier,
/// preserving first-occurrence order
fn fold_explicit_updates(
    updates: Vec<ModuleUpdate>,
) -> Result<Vec<ModuleUpdate>, TrackerError> {
    let mut order: Vec<Qualifier> = Vec::new();
    let mut accumulated: HashMap<Qualifier, ModuleUpdate> = HashMap::new();
    for update in updates {
        let qualifier = update.qualifier().clone();
        match accumulated.remove(&qualifier) {
            None => {
                order.push(qualifier.clone());
                accumulated.insert(qualifier, update);
            }
            Some(previous) => {
                accumulated.insert(qualifier, merge_update_pair(previous, update)?);
            }
        }
    }
    Ok(order
        .into_iter()
        .filter_map(|qualifier| accumulated.remove(&qualifier))
        .collect())
}

/// The merge lattice over `(New, Changed, Delete)`. Pairs that contradict
/// the table state are invariant violations and fail loudly.
fn merge_update_pair(
    first: ModuleUpdate,
    second: ModuleUpdate,
) -> Result<ModuleUpdate, TrackerError> {
    use ModuleUpdate::{Changed, Delete, New};
    match (first, second) {
        (New(_), Changed(module_path)) => Ok(New(module_path)),
        (New(module_path), Delete(_)) => Ok(Changed(module_path)),
        (Changed(_), Changed(module_path)) => Ok(Changed(module_path)),
        (Changed(_), Delete(qualifier)) => Ok(Delete(qualifier)),
        (Delete(_), New(module_path)) => Ok(Changed(module_path)),
        (first, second) => Err(TrackerError::InvariantViolation(format!(
            "cannot merge module updates {first:?} followed by {second:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_path::RawModulePath;

    fn module_path(relative: &str, qualifier: &str) -> ModulePath {
        ModulePath::new(
            RawModulePath {
                root_index: 0,
                relative: PathBuf::from(relative),
                should_type_check: true,
            },
            Qualifier::from_dotted(qualifier),
            relative.ends_with(".pyi"),
            false,
        )
    }

    #[test]
    fn test_merge_new_then_delete_is_changed() {
        let merged = merge_update_pair(
            ModuleUpdate::New(module_path("a.py", "a")),
            ModuleUpdate::Delete(Qualifier::from_dotted("a")),
        )
        .unwrap();
        assert!(matches!(merged, ModuleUpdate::Changed(_)));
    }

    #[test]
    fn test_merge_delete_then_new_is_changed() {
        let merged = merge_update_pair(
            ModuleUpdate::Delete(Qualifier::from_dotted("a")),
            ModuleUpdate::New(module_path("a.py", "a")),
        )
        .unwrap();
        assert!(matches!(merged, ModuleUpdate::Changed(_)));
    }

    #[test]
    fn test_merge_changed_then_delete_stays_delete() {
        let merged = merge_update_pair(
            ModuleUpdate::Changed(module_path("a.py", "a")),
            ModuleUpdate::Delete(Qualifier::from_dotted("a")),
        )
        .unwrap();
        assert_eq!(merged, ModuleUpdate::Delete(Qualifier::from_dotted("a")));
    }

    #[test]
    fn test_merge_illegal_pairs_fail_loudly() {
        let illegal = [
            (
                ModuleUpdate::New(module_path("a.py", "a")),
                ModuleUpdate::New(module_path("a.pyi", "a")),
            ),
            (
                ModuleUpdate::Changed(module_path("a.py", "a")),
                ModuleUpdate::New(module_path("a.pyi", "a")),
            ),
            (
                ModuleUpdate::Delete(Qualifier::from_dotted("a")),
                ModuleUpdate::Delete(Qualifier::from_dotted("a")),
            ),
            (
                ModuleUpdate::Delete(Qualifier::from_dotted("a")),
                ModuleUpdate::Changed(module_path("a.py", "a")),
            ),
        ];
        for (first, second) in illegal {
            assert!(
                matches!(
                    merge_update_pair(first.clone(), second.clone()),
                    Err(TrackerError::InvariantViolation(_))
                ),
                "{first:?} then {second:?} must be rejected"
            );
        }
    }

    #[test]
    fn test_insert_module_orders_by_priority() {
        let mut tables = Tables::default();
        let implementation = module_path("a.py", "a");
        let stub = ModulePath::new(
            RawModulePath {
                root_index: 1,
                relative: PathBuf::from("a.pyi"),
                should_type_check: true,
            },
            Qualifier::from_dotted("a"),
            true,
            false,
        );

        assert_eq!(
            tables.insert_module(implementation.clone()),
            Some(ModuleUpdate::New(implementation))
        );
        // The stub shadows the implementation and becomes the new head.
        assert_eq!(
            tables.insert_module(stub.clone()),
            Some(ModuleUpdate::Changed(stub))
        );
    }

    #[test]
    fn test_insert_shadowed_module_emits_nothing() {
        let mut tables = Tables::default();
        let stub = ModulePath::new(
            RawModulePath {
                root_index: 0,
                relative: PathBuf::from("a.pyi"),
                should_type_check: true,
            },
            Qualifier::from_dotted("a"),
            true,
            false,
        );
        let implementation = ModulePath::new(
            RawModulePath {
                root_index: 1,
                relative: PathBuf::from("a.py"),
                should_type_check: true,
            },
            Qualifier::from_dotted("a"),
            false,
            false,
        );
        tables.insert_module(stub);
        assert_eq!(tables.insert_module(implementation), None);
    }

    #[test]
    fn test_remove_module_transitions() {
        let mut tables = Tables::default();
        let stub = ModulePath::new(
            RawModulePath {
                root_index: 0,
                relative: PathBuf::from("a.pyi"),
                should_type_check: true,
            },
            Qualifier::from_dotted("a"),
            true,
            false,
        );
        let implementation = ModulePath::new(
            RawModulePath {
                root_index: 1,
                relative: PathBuf::from("a.py"),
                should_type_check: true,
            },
            Qualifier::from_dotted("a"),
            false,
            false,
        );
        tables.insert_module(stub.clone());
        tables.insert_module(implementation.clone());

        // Removing the shadowed implementation is unobservable.
        assert_eq!(tables.remove_module(&implementation), None);
        tables.insert_module(implementation.clone());
        // Removing the head hands the qualifier to the implementation.
        assert_eq!(
            tables.remove_module(&stub),
            Some(ModuleUpdate::Changed(implementation.clone()))
        );
        // Removing the last entry deletes the qualifier.
        assert_eq!(
            tables.remove_module(&implementation),
            Some(ModuleUpdate::Delete(Qualifier::from_dotted("a")))
        );
        assert_eq!(
            tables.lookup(&Qualifier::from_dotted("a")),
            LookupResult::NotFound
        );
    }
}
