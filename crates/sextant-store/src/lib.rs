//! Shared store for derived analysis state
//!
//! Provides namespaced key-value and single-value tables backed by one
//! in-memory store handle. Tables serialize their entries with serde, so a
//! whole store can be written to a saved-state file and re-attached by a
//! later session. Namespaces are string prefixes chosen at table
//! construction; two tables with distinct prefixes can never observe each
//! other's entries.
//!
//! The store is a handle threaded through the API, not process-wide state:
//! every table borrows a `Store` clone, and `Store::reset` clears
//! everything for tests.

pub mod saved_state;
pub mod table;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

pub use saved_state::{LoadOutcome, UnusedReason, FORMAT_VERSION};
pub use table::{KeyValueTable, SingleValueTable};

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize entry for namespace '{namespace}': {error}")]
    Serialize {
        namespace: String,
        error: serde_json::Error,
    },

    #[error("failed to deserialize entry for namespace '{namespace}': {error}")]
    Deserialize {
        namespace: String,
        error: serde_json::Error,
    },

    #[error("I/O error on saved state at {path}: {error}")]
    Io {
        path: std::path::PathBuf,
        error: std::io::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Separator between a table's namespace prefix and the encoded key.
///
/// Namespace prefixes must not contain this character; table constructors
/// debug-assert it.
pub(crate) const NAMESPACE_SEPARATOR: char = '\u{1f}';

/// Handle to one shared store.
///
/// Cheap to clone; all clones observe the same entries. Writes are
/// serialized by the owning driver, readers may consult the store
/// concurrently.
#[derive(Debug, Clone, Default)]
pub struct Store {
    entries: Arc<RwLock<BTreeMap<String, serde_json::Value>>>,
}

impl Store {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a key-value table bound to `namespace` within this store
    pub fn key_value_table<K, V>(&self, namespace: &str) -> KeyValueTable<K, V>
    where
        K: serde::Serialize + serde::de::DeserializeOwned,
        V: serde::Serialize + serde::de::DeserializeOwned,
    {
        KeyValueTable::new(self.clone(), namespace)
    }

    /// Create a single-value table bound to `namespace` within this store
    pub fn single_value_table<V>(&self, namespace: &str) -> SingleValueTable<V>
    where
        V: serde::Serialize + serde::de::DeserializeOwned,
    {
        SingleValueTable::new(self.clone(), namespace)
    }

    /// Drop every entry in every namespace. Test support.
    pub fn reset(&self) {
        self.entries
            .write()
            .expect("store lock poisoned")
            .clear();
    }

    /// Total number of entries across all namespaces
    pub fn len(&self) -> usize {
        self.entries.read().expect("store lock poisoned").len()
    }

    /// Whether the store holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn insert(&self, full_key: String, value: serde_json::Value) {
        self.entries
            .write()
            .expect("store lock poisoned")
            .insert(full_key, value);
    }

    pub(crate) fn get(&self, full_key: &str) -> Option<serde_json::Value> {
        self.entries
            .read()
            .expect("store lock poisoned")
            .get(full_key)
            .cloned()
    }

    pub(crate) fn contains(&self, full_key: &str) -> bool {
        self.entries
            .read()
            .expect("store lock poisoned")
            .contains_key(full_key)
    }

    pub(crate) fn remove(&self, full_key: &str) {
        self.entries
            .write()
            .expect("store lock poisoned")
            .remove(full_key);
    }

    pub(crate) fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .read()
            .expect("store lock poisoned")
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, serde_json::Value> {
        self.entries.read().expect("store lock poisoned").clone()
    }

    pub(crate) fn replace_all(&self, entries: BTreeMap<String, serde_json::Value>) {
        *self.entries.write().expect("store lock poisoned") = entries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_all_namespaces() {
        let store = Store::new();
        let a: KeyValueTable<String, u32> = store.key_value_table("a");
        let b: KeyValueTable<String, u32> = store.key_value_table("b");
        a.add(&"x".to_string(), &1).unwrap();
        b.add(&"x".to_string(), &2).unwrap();
        assert_eq!(store.len(), 2);

        store.reset();
        assert!(store.is_empty());
        assert_eq!(a.get(&"x".to_string()), None);
    }

    #[test]
    fn test_clones_share_entries() {
        let store = Store::new();
        let table: KeyValueTable<String, u32> = store.key_value_table("t");
        table.add(&"k".to_string(), &7).unwrap();

        let other: KeyValueTable<String, u32> = store.clone().key_value_table("t");
        assert_eq!(other.get(&"k".to_string()), Some(7));
    }
}
