use bytes::Bytes;

use super::error::HamtError;
use super::hash_bits::HashBits;
use crate::cbor::{self, Value};
use crate::cid::ContentId;
use crate::store::BlockStore;

/// Bits of key hash consumed per tree level (32-way fanout).
pub const TREE_BIT_WIDTH: u32 = 5;

/// Entries a leaf holds before sharding one level down.
const BUCKET_SIZE: usize = 3;

#[derive(Debug)]
struct KeyValue {
    key: String,
    value: Bytes,
}

#[derive(Debug)]
enum Pointer {
    /// A leaf bucket of up to [`BUCKET_SIZE`] entries, sorted by key.
    Values(Vec<KeyValue>),
    /// A child shard persisted in the block store.
    Link(ContentId),
    /// A child shard loaded into memory; re-linked on flush.
    Cached(Box<Node>),
}

/// A node of the persistent map.
///
/// The root node is owned by the index; children are loaded on demand and
/// written back by [`Node::flush`].
#[derive(Debug, Default)]
pub struct Node {
    bitfield: u32,
    pointers: Vec<Pointer>,
}

impl Node {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            bitfield: 0,
            pointers: Vec::new(),
        }
    }

    /// Loads a node from the block store by its content id.
    pub fn load(store: &dyn BlockStore, cid: &ContentId) -> Result<Self, HamtError> {
        let block = store.get(cid)?;
        Self::decode(&block)
    }

    /// Returns the value stored under `key`, or `None`.
    pub fn get(&self, store: &dyn BlockStore, key: &str) -> Result<Option<Bytes>, HamtError> {
        let mut hb = HashBits::new(key);
        self.lookup(store, &mut hb, key)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&mut self, store: &dyn BlockStore, key: &str, value: Bytes) -> Result<(), HamtError> {
        let mut hb = HashBits::new(key);
        self.modify_set(store, &mut hb, key.to_string(), value)
    }

    /// Removes `key`. Returns `true` if it was present.
    pub fn delete(&mut self, store: &dyn BlockStore, key: &str) -> Result<bool, HamtError> {
        let mut hb = HashBits::new(key);
        self.modify_delete(store, &mut hb, key)
    }

    /// Calls `f` for every entry of the map.
    ///
    /// Traversal order is the trie order of the hashed keys and is stable for
    /// a given set of keys.
    pub fn for_each<F>(&self, store: &dyn BlockStore, f: &mut F) -> Result<(), HamtError>
    where
        F: FnMut(&str, &Bytes) -> Result<(), HamtError>,
    {
        for pointer in &self.pointers {
            match pointer {
                Pointer::Values(kvs) => {
                    for kv in kvs {
                        f(&kv.key, &kv.value)?;
                    }
                }
                Pointer::Cached(child) => child.for_each(store, f)?,
                Pointer::Link(cid) => Self::load(store, cid)?.for_each(store, f)?,
            }
        }
        Ok(())
    }

    /// Persists the map through the block store and returns the root cid.
    ///
    /// Loaded subtrees are serialized bottom-up and replaced by links; any
    /// node that fails to persist fails the whole flush.
    pub fn flush(&mut self, store: &dyn BlockStore) -> Result<ContentId, HamtError> {
        for pointer in &mut self.pointers {
            if let Pointer::Cached(child) = pointer {
                let cid = child.flush(store)?;
                *pointer = Pointer::Link(cid);
            }
        }
        let bytes = self.encode()?;
        Ok(store.put(Bytes::from(bytes))?)
    }

    /// Number of entries, counted by full traversal.
    pub fn len(&self, store: &dyn BlockStore) -> Result<usize, HamtError> {
        let mut count = 0;
        self.for_each(store, &mut |_, _| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    fn index_for(&self, bit: u32) -> usize {
        (self.bitfield & (bit - 1)).count_ones() as usize
    }

    fn lookup(
        &self,
        store: &dyn BlockStore,
        hb: &mut HashBits,
        key: &str,
    ) -> Result<Option<Bytes>, HamtError> {
        let idx = hb.next()?;
        let bit = 1u32 << idx;
        if self.bitfield & bit == 0 {
            return Ok(None);
        }
        match &self.pointers[self.index_for(bit)] {
            Pointer::Values(kvs) => Ok(kvs
                .iter()
                .find(|kv| kv.key == key)
                .map(|kv| kv.value.clone())),
            Pointer::Cached(child) => child.lookup(store, hb, key),
            Pointer::Link(cid) => Self::load(store, cid)?.lookup(store, hb, key),
        }
    }

    fn modify_set(
        &mut self,
        store: &dyn BlockStore,
        hb: &mut HashBits,
        key: String,
        value: Bytes,
    ) -> Result<(), HamtError> {
        let idx = hb.next()?;
        let bit = 1u32 << idx;
        let pos = self.index_for(bit);

        if self.bitfield & bit == 0 {
            self.pointers.insert(pos, Pointer::Values(vec![KeyValue { key, value }]));
            self.bitfield |= bit;
            return Ok(());
        }

        if let Pointer::Values(kvs) = &mut self.pointers[pos] {
            if let Some(kv) = kvs.iter_mut().find(|kv| kv.key == key) {
                kv.value = value;
                return Ok(());
            }
            if kvs.len() < BUCKET_SIZE {
                let at = kvs
                    .iter()
                    .position(|kv| kv.key > key)
                    .unwrap_or(kvs.len());
                kvs.insert(at, KeyValue { key, value });
                return Ok(());
            }
            // bucket overflow: push the entries one level down
            let consumed = hb.consumed();
            let taken = std::mem::take(kvs);
            let mut child = Node::new();
            for kv in taken {
                let mut khb = HashBits::resume(&kv.key, consumed);
                child.modify_set(store, &mut khb, kv.key, kv.value)?;
            }
            child.modify_set(store, hb, key, value)?;
            self.pointers[pos] = Pointer::Cached(Box::new(child));
            return Ok(());
        }

        self.descend_mut(store, pos)?.modify_set(store, hb, key, value)
    }

    fn modify_delete(
        &mut self,
        store: &dyn BlockStore,
        hb: &mut HashBits,
        key: &str,
    ) -> Result<bool, HamtError> {
        let idx = hb.next()?;
        let bit = 1u32 << idx;
        if self.bitfield & bit == 0 {
            return Ok(false);
        }
        let pos = self.index_for(bit);

        if let Pointer::Values(kvs) = &mut self.pointers[pos] {
            let Some(at) = kvs.iter().position(|kv| kv.key == key) else {
                return Ok(false);
            };
            kvs.remove(at);
            if kvs.is_empty() {
                self.pointers.remove(pos);
                self.bitfield &= !bit;
            }
            return Ok(true);
        }

        let found = self
            .descend_mut(store, pos)?
            .modify_delete(store, hb, key)?;
        if found {
            self.clean_child(pos, bit);
        }
        Ok(found)
    }

    /// Promotes a clean link to a cached child and returns it for mutation.
    fn descend_mut(
        &mut self,
        store: &dyn BlockStore,
        pos: usize,
    ) -> Result<&mut Node, HamtError> {
        if let Pointer::Link(cid) = &self.pointers[pos] {
            let child = Self::load(store, cid)?;
            self.pointers[pos] = Pointer::Cached(Box::new(child));
        }
        match &mut self.pointers[pos] {
            Pointer::Cached(child) => Ok(child),
            _ => Err(HamtError::InvalidNode("expected shard pointer")),
        }
    }

    /// Restores canonical form after a delete: an empty child is unlinked,
    /// and a child whose remaining entries fit one leaf is inlined so equal
    /// contents always produce equal trees.
    fn clean_child(&mut self, pos: usize, bit: u32) {
        let Pointer::Cached(child) = &mut self.pointers[pos] else {
            return;
        };
        match child.pointers.len() {
            0 => {
                self.pointers.remove(pos);
                self.bitfield &= !bit;
            }
            1 => {
                if matches!(child.pointers[0], Pointer::Values(_)) {
                    if let Some(Pointer::Values(kvs)) = child.pointers.pop() {
                        self.pointers[pos] = Pointer::Values(kvs);
                    }
                }
            }
            _ => {
                let total: usize = child
                    .pointers
                    .iter()
                    .map(|p| match p {
                        Pointer::Values(kvs) => kvs.len(),
                        // a shard keeps the child alive regardless of count
                        _ => BUCKET_SIZE + 1,
                    })
                    .sum();
                if total <= BUCKET_SIZE {
                    let mut merged = Vec::with_capacity(total);
                    for pointer in child.pointers.drain(..) {
                        if let Pointer::Values(kvs) = pointer {
                            merged.extend(kvs);
                        }
                    }
                    merged.sort_by(|a, b| a.key.cmp(&b.key));
                    self.pointers[pos] = Pointer::Values(merged);
                }
            }
        }
    }

    fn encode(&self) -> Result<Vec<u8>, HamtError> {
        let mut pointers = Vec::with_capacity(self.pointers.len());
        for pointer in &self.pointers {
            let value = match pointer {
                Pointer::Link(cid) => Value::Map(vec![(
                    "l".to_string(),
                    Value::bytes(cid.as_bytes()),
                )]),
                Pointer::Values(kvs) => Value::Map(vec![(
                    "v".to_string(),
                    Value::Array(
                        kvs.iter()
                            .map(|kv| {
                                Value::Array(vec![
                                    Value::text(&kv.key),
                                    Value::Bytes(kv.value.clone()),
                                ])
                            })
                            .collect(),
                    ),
                )]),
                // children are re-linked by flush before a node is encoded
                Pointer::Cached(_) => return Err(HamtError::InvalidNode("unflushed child")),
            };
            pointers.push(value);
        }
        let node = Value::Array(vec![
            Value::Unsigned(self.bitfield as u64),
            Value::Array(pointers),
        ]);
        Ok(cbor::encode(&node)?)
    }

    fn decode(data: &[u8]) -> Result<Self, HamtError> {
        let value = cbor::decode(data)?;
        let parts = value
            .as_array()
            .ok_or(HamtError::InvalidNode("expected array"))?;
        if parts.len() != 2 {
            return Err(HamtError::InvalidNode("expected two elements"));
        }
        let bitfield = parts[0]
            .as_unsigned()
            .filter(|b| *b <= u32::MAX as u64)
            .ok_or(HamtError::InvalidNode("bad bitfield"))? as u32;
        let encoded = parts[1]
            .as_array()
            .ok_or(HamtError::InvalidNode("expected pointer array"))?;
        if encoded.len() != bitfield.count_ones() as usize {
            return Err(HamtError::InvalidNode("pointer count mismatch"));
        }

        let mut pointers = Vec::with_capacity(encoded.len());
        for entry in encoded {
            pointers.push(Self::decode_pointer(entry)?);
        }
        Ok(Self { bitfield, pointers })
    }

    fn decode_pointer(value: &Value) -> Result<Pointer, HamtError> {
        let entries = value
            .as_map()
            .filter(|m| m.len() == 1)
            .ok_or(HamtError::InvalidNode("bad pointer"))?;
        let (tag, body) = &entries[0];
        match tag.as_str() {
            "l" => {
                let bytes = body
                    .as_bytes()
                    .ok_or(HamtError::InvalidNode("bad link"))?;
                let cid = ContentId::from_slice(bytes)
                    .map_err(|_| HamtError::InvalidNode("bad link"))?;
                Ok(Pointer::Link(cid))
            }
            "v" => {
                let items = body
                    .as_array()
                    .filter(|a| !a.is_empty() && a.len() <= BUCKET_SIZE)
                    .ok_or(HamtError::InvalidNode("bad leaf"))?;
                let mut kvs = Vec::with_capacity(items.len());
                for item in items {
                    let pair = item
                        .as_array()
                        .filter(|p| p.len() == 2)
                        .ok_or(HamtError::InvalidNode("bad entry"))?;
                    let key = pair[0]
                        .as_str()
                        .ok_or(HamtError::InvalidNode("bad entry key"))?;
                    let value = pair[1]
                        .as_bytes()
                        .ok_or(HamtError::InvalidNode("bad entry value"))?;
                    kvs.push(KeyValue {
                        key: key.to_string(),
                        value: value.clone(),
                    });
                }
                Ok(Pointer::Values(kvs))
            }
            _ => Err(HamtError::InvalidNode("unknown pointer tag")),
        }
    }
}
