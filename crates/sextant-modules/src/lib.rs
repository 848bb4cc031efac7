//! Module discovery and tracking
//!
//! Maps dotted qualifiers to files across ordered search roots and keeps
//! that mapping current under filesystem events. Provides:
//! - [`Qualifier`] / [`ModulePath`]: names and file handles with
//!   priority-aware precedence (stubs shadow implementations)
//! - [`SearchRoots`]: classification of paths against the root set
//! - eager and lazy [`finder`]s over the same classification rules
//! - [`ModuleTracker`]: explicit and implicit (namespace package) tables
//!   with a net per-qualifier update stream
//! - [`Overlay`]: in-memory source overrides over a read-only view

pub mod error;
pub mod events;
pub mod finder;
pub mod module_path;
pub mod overlay;
pub mod qualifier;
pub mod search_roots;
pub mod tracker;

pub use error::{CodeReadError, TrackerError};
pub use events::{FileEvent, FileEventKind, ModulePathUpdate, ModuleUpdate};
pub use finder::LazyFinder;
pub use module_path::{ModulePath, RawModulePath};
pub use overlay::{CodeUpdate, Overlay};
pub use qualifier::Qualifier;
pub use search_roots::{SearchRoot, SearchRoots};
pub use tracker::{LookupResult, ModuleReader, ModuleTracker, ReadOnlyView, Tracking};
