//! Saved-state persistence for the shared store
//!
//! A store can be flushed to a JSON file and re-attached by a later
//! session. Save errors are logged and swallowed so a failed flush never
//! takes down the session that produced the state; load failures yield
//! [`LoadOutcome::Unused`] and the caller recomputes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Store;

/// Version stamp embedded in every saved-state file. Bump on any change to
/// the document layout; mismatched files are rejected as stale.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SavedStateDocument {
    version: u32,
    entries: BTreeMap<String, serde_json::Value>,
}

/// Result of attempting to re-attach to a saved state
#[derive(Debug)]
pub enum LoadOutcome {
    /// The file was valid; the returned store holds its entries
    Loaded(Store),
    /// The file could not be used; recompute from scratch
    Unused(UnusedReason),
}

/// Why a saved state was not used
#[derive(Debug)]
pub enum UnusedReason {
    /// The file was missing, unreadable, or malformed
    LoadError(String),
    /// The file was written by an incompatible version
    Stale { expected: u32, found: u32 },
}

impl Store {
    /// Write every table's entries to `path`.
    ///
    /// Errors are logged at warn level and swallowed: a saved state is an
    /// optimization, not required for correctness.
    pub fn save_to_file(&self, path: &Path) {
        let document = SavedStateDocument {
            version: FORMAT_VERSION,
            entries: self.snapshot(),
        };
        let serialized = match serde_json::to_vec(&document) {
            Ok(serialized) => serialized,
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to serialize saved state");
                return;
            }
        };
        if let Err(error) = std::fs::write(path, serialized) {
            warn!(path = %path.display(), %error, "failed to write saved state");
            return;
        }
        info!(path = %path.display(), entries = document.entries.len(), "saved state written");
    }

    /// Attach to the saved state at `path`, if it is present and current
    pub fn load_from_file(path: &Path) -> LoadOutcome {
        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(error) => return LoadOutcome::Unused(UnusedReason::LoadError(error.to_string())),
        };
        let document: SavedStateDocument = match serde_json::from_slice(&contents) {
            Ok(document) => document,
            Err(error) => return LoadOutcome::Unused(UnusedReason::LoadError(error.to_string())),
        };
        if document.version != FORMAT_VERSION {
            return LoadOutcome::Unused(UnusedReason::Stale {
                expected: FORMAT_VERSION,
                found: document.version,
            });
        }
        let store = Store::new();
        store.replace_all(document.entries);
        LoadOutcome::Loaded(store)
    }
}
