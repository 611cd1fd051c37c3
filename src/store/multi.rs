use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::block::MemoryBlockStore;
use super::error::StoreError;

/// Identifier of a sub-store inside a [`MultiStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(pub u64);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logical namespace holding the blocks of exactly one committed DAG.
///
/// Deleting the sub-store garbage collects the whole DAG at once.
pub struct SubStore {
    id: StoreId,
    bstore: Arc<MemoryBlockStore>,
}

impl SubStore {
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// The block store holding this DAG's blocks.
    pub fn bstore(&self) -> &Arc<MemoryBlockStore> {
        &self.bstore
    }
}

/// A registry of sub-stores, one per committed DAG.
///
/// The index records which sub-store backs each held content root and is the
/// only entity allowed to delete sub-stores (on drop or eviction).
#[derive(Default)]
pub struct MultiStore {
    next_id: AtomicU64,
    stores: DashMap<StoreId, Arc<SubStore>>,
}

impl MultiStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            stores: DashMap::new(),
        }
    }

    /// Creates a fresh sub-store and registers it.
    pub fn add(&self) -> Arc<SubStore> {
        let id = StoreId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let store = Arc::new(SubStore {
            id,
            bstore: Arc::new(MemoryBlockStore::new()),
        });
        self.stores.insert(id, store.clone());
        store
    }

    /// Returns the sub-store with the given id.
    pub fn get(&self, id: StoreId) -> Result<Arc<SubStore>, StoreError> {
        self.stores
            .get(&id)
            .map(|s| s.value().clone())
            .ok_or(StoreError::StoreNotFound(id))
    }

    /// Deletes a sub-store and all its blocks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreNotFound`] if no sub-store has this id.
    pub fn delete(&self, id: StoreId) -> Result<(), StoreError> {
        self.stores
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::StoreNotFound(id))
    }

    /// Ids of all registered sub-stores.
    pub fn list(&self) -> Vec<StoreId> {
        self.stores.iter().map(|s| *s.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
