//! Namespaced tables over the shared store
//!
//! A table is a typed view of one namespace. Keys and values cross the
//! store boundary as JSON, so the only bounds are serde ones; this replaces
//! per-type table instantiation with one generic abstraction.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::{Store, StoreError, StoreResult, NAMESPACE_SEPARATOR};

/// Key-value table bound to one namespace.
///
/// The namespace prefix segregates this table's entries from every other
/// table in the same store.
#[derive(Debug, Clone)]
pub struct KeyValueTable<K, V> {
    store: Store,
    namespace: String,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V> KeyValueTable<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    pub(crate) fn new(store: Store, namespace: &str) -> Self {
        debug_assert!(
            !namespace.contains(NAMESPACE_SEPARATOR),
            "namespace must not contain the separator character"
        );
        Self {
            store,
            namespace: namespace.to_owned(),
            _marker: PhantomData,
        }
    }

    /// The namespace this table owns
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Insert or replace the value stored under `key`
    pub fn add(&self, key: &K, value: &V) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(|error| StoreError::Serialize {
            namespace: self.namespace.clone(),
            error,
        })?;
        self.store.insert(self.full_key(key)?, value);
        Ok(())
    }

    /// Look up the value stored under `key`.
    ///
    /// Entries that fail to decode (possible only after loading a corrupted
    /// saved state) are treated as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let full_key = self.full_key(key).ok()?;
        let value = self.store.get(&full_key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                debug!(namespace = %self.namespace, %error, "dropping undecodable store entry");
                None
            }
        }
    }

    /// Whether an entry exists under `key`
    pub fn mem(&self, key: &K) -> bool {
        self.full_key(key)
            .map(|full_key| self.store.contains(&full_key))
            .unwrap_or(false)
    }

    /// Look up many keys at once, preserving order
    pub fn get_batch(&self, keys: &[K]) -> Vec<Option<V>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Remove every entry among `keys`; missing keys are ignored
    pub fn remove_batch(&self, keys: &[K]) {
        for key in keys {
            if let Ok(full_key) = self.full_key(key) {
                self.store.remove(&full_key);
            }
        }
    }

    /// Bulk-insert an association list
    pub fn of_alist(&self, pairs: &[(K, V)]) -> StoreResult<()> {
        for (key, value) in pairs {
            self.add(key, value)?;
        }
        Ok(())
    }

    /// Dump every entry in this namespace as an association list
    pub fn to_alist(&self) -> StoreResult<Vec<(K, V)>> {
        let prefix = format!("{}{}", self.namespace, NAMESPACE_SEPARATOR);
        let mut pairs = Vec::new();
        for full_key in self.store.keys_with_prefix(&prefix) {
            let encoded_key = &full_key[prefix.len()..];
            let key = serde_json::from_str(encoded_key).map_err(|error| {
                StoreError::Deserialize {
                    namespace: self.namespace.clone(),
                    error,
                }
            })?;
            let value = self.store.get(&full_key).and_then(|value| {
                serde_json::from_value(value).ok()
            });
            if let Some(value) = value {
                pairs.push((key, value));
            }
        }
        Ok(pairs)
    }

    /// The set of keys currently owned by this table.
    ///
    /// Persisting this handle through a [`SingleValueTable`] lets an
    /// incremental session re-attach to prior state.
    pub fn handle(&self) -> StoreResult<Vec<K>> {
        Ok(self.to_alist()?.into_iter().map(|(key, _)| key).collect())
    }

    fn full_key(&self, key: &K) -> StoreResult<String> {
        let encoded = serde_json::to_string(key).map_err(|error| StoreError::Serialize {
            namespace: self.namespace.clone(),
            error,
        })?;
        Ok(format!(
            "{}{}{}",
            self.namespace, NAMESPACE_SEPARATOR, encoded
        ))
    }
}

/// Table holding at most one value, used to persist per-table handles and
/// other singleton state.
#[derive(Debug, Clone)]
pub struct SingleValueTable<V> {
    store: Store,
    namespace: String,
    _marker: PhantomData<fn() -> V>,
}

impl<V> SingleValueTable<V>
where
    V: Serialize + DeserializeOwned,
{
    pub(crate) fn new(store: Store, namespace: &str) -> Self {
        debug_assert!(
            !namespace.contains(NAMESPACE_SEPARATOR),
            "namespace must not contain the separator character"
        );
        Self {
            store,
            namespace: namespace.to_owned(),
            _marker: PhantomData,
        }
    }

    /// The namespace this table owns
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Store the value, replacing any previous one
    pub fn store(&self, value: &V) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(|error| StoreError::Serialize {
            namespace: self.namespace.clone(),
            error,
        })?;
        self.store.insert(self.full_key(), value);
        Ok(())
    }

    /// Load the stored value, if any
    pub fn load(&self) -> Option<V> {
        let value = self.store.get(&self.full_key())?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                debug!(namespace = %self.namespace, %error, "dropping undecodable store entry");
                None
            }
        }
    }

    /// Remove the stored value
    pub fn remove(&self) {
        self.store.remove(&self.full_key());
    }

    fn full_key(&self) -> String {
        format!("{}{}", self.namespace, NAMESPACE_SEPARATOR)
    }
}
