//! Filesystem events and module update records
//!
//! Raw filesystem events come in from the artifact tree (or a watcher);
//! the tracker turns them into [`ModulePathUpdate`]s and answers with a
//! net [`ModuleUpdate`] stream, one update per affected qualifier.

use std::path::PathBuf;

use crate::module_path::ModulePath;
use crate::qualifier::Qualifier;

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    CreatedOrChanged,
    Removed,
}

/// One atomic filesystem event, with an absolute path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
}

impl FileEvent {
    pub fn created_or_changed(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FileEventKind::CreatedOrChanged,
            path: path.into(),
        }
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FileEventKind::Removed,
            path: path.into(),
        }
    }
}

/// A filesystem event translated to the module it affects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModulePathUpdate {
    NewOrChanged(ModulePath),
    Remove(ModulePath),
}

impl ModulePathUpdate {
    pub fn module_path(&self) -> &ModulePath {
        match self {
            Self::NewOrChanged(module_path) | Self::Remove(module_path) => module_path,
        }
    }
}

/// The net effect of an update batch on one qualifier.
///
/// `New`/`Changed`/`Delete` describe the explicit table: a qualifier
/// gained its first backing file, its winning file changed, or its last
/// backing file vanished. `NewImplicit` reports a namespace package
/// becoming importable; a namespace package emptying is reported as a
/// plain `Delete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleUpdate {
    New(ModulePath),
    Changed(ModulePath),
    Delete(Qualifier),
    NewImplicit(Qualifier),
}

impl ModuleUpdate {
    pub fn qualifier(&self) -> &Qualifier {
        match self {
            Self::New(module_path) | Self::Changed(module_path) => module_path.qualifier(),
            Self::Delete(qualifier) | Self::NewImplicit(qualifier) => qualifier,
        }
    }
}
