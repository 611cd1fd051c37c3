use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;

use super::error::StoreError;
use super::kv::KvStore;
use crate::cid::ContentId;

/// A content-addressed block store.
///
/// Blocks are keyed by the SHA-256 of their bytes; `put` computes the key and
/// returns it. Implementations must be safe to share across threads.
pub trait BlockStore: Send + Sync {
    /// Returns the block with the given content id.
    fn get(&self, cid: &ContentId) -> Result<Bytes, StoreError>;

    /// Stores a block and returns its content id.
    fn put(&self, data: Bytes) -> Result<ContentId, StoreError>;

    /// Returns `true` if a block with the given content id is stored.
    fn has(&self, cid: &ContentId) -> bool;

    /// Removes a block. Removing an absent block is not an error.
    fn delete(&self, cid: &ContentId) -> Result<(), StoreError>;
}

/// An in-memory block store.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: DashMap<ContentId, Bytes>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self {
            blocks: DashMap::new(),
        }
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Sum of the raw sizes of all stored blocks.
    pub fn total_size(&self) -> u64 {
        self.blocks.iter().map(|b| b.value().len() as u64).sum()
    }
}

impl BlockStore for MemoryBlockStore {
    fn get(&self, cid: &ContentId) -> Result<Bytes, StoreError> {
        self.blocks
            .get(cid)
            .map(|b| b.value().clone())
            .ok_or(StoreError::BlockNotFound(*cid))
    }

    fn put(&self, data: Bytes) -> Result<ContentId, StoreError> {
        let cid = ContentId::of(&data);
        self.blocks.insert(cid, data);
        Ok(cid)
    }

    fn has(&self, cid: &ContentId) -> bool {
        self.blocks.contains_key(cid)
    }

    fn delete(&self, cid: &ContentId) -> Result<(), StoreError> {
        self.blocks.remove(cid);
        Ok(())
    }
}

/// A block store persisting through a [`KvStore`].
///
/// Blocks live under `blocks/<hex cid>` in the underlying store, so an index
/// and its persistent map nodes share one key-value store and survive
/// restarts together.
pub struct KvBlockStore {
    kv: Arc<dyn KvStore>,
}

impl KvBlockStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(cid: &ContentId) -> String {
        format!("blocks/{}", cid.to_hex())
    }
}

impl BlockStore for KvBlockStore {
    fn get(&self, cid: &ContentId) -> Result<Bytes, StoreError> {
        self.kv
            .get(&Self::key(cid))?
            .ok_or(StoreError::BlockNotFound(*cid))
    }

    fn put(&self, data: Bytes) -> Result<ContentId, StoreError> {
        let cid = ContentId::of(&data);
        self.kv.put(&Self::key(&cid), data)?;
        Ok(cid)
    }

    fn has(&self, cid: &ContentId) -> bool {
        matches!(self.kv.get(&Self::key(cid)), Ok(Some(_)))
    }

    fn delete(&self, cid: &ContentId) -> Result<(), StoreError> {
        self.kv.delete(&Self::key(cid))?;
        Ok(())
    }
}
