use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use super::error::StoreError;

/// A flat key-value store with string keys.
///
/// The index uses one well-known key for its persistent map root and a
/// `blocks/` prefix for map nodes (see
/// [`KvBlockStore`](super::KvBlockStore)).
pub trait KvStore: Send + Sync {
    /// Returns the value at `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Stores `value` at `key`, replacing any previous value.
    fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    /// Removes `key`. Returns `true` if it was present.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// An in-memory key-value store.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().remove(key).is_some())
    }
}

/// A key-value store view that prefixes every key with a namespace.
///
/// `Namespaced::new(kv, "/index")` maps key `idx` to `/index/idx` in the
/// wrapped store, keeping one physical store shareable between subsystems.
pub struct Namespaced {
    inner: Arc<dyn KvStore>,
    prefix: String,
}

impl Namespaced {
    pub fn new(inner: Arc<dyn KvStore>, prefix: &str) -> Self {
        Self {
            inner,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key)
    }
}

impl KvStore for Namespaced {
    fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.inner.get(&self.full_key(key))
    }

    fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.inner.put(&self.full_key(key), value)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(&self.full_key(key))
    }
}
