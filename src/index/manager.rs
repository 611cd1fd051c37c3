use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::buckets::BucketList;
use super::error::IndexError;
use super::record::ContentRef;
use crate::cid::ContentId;
use crate::hamt::{HamtError, Node};
use crate::store::{BlockStore, KvBlockStore, KvStore, MultiStore, Namespaced, StoreId, SubStore};

/// Key holding the persistent map root cid, inside the index namespace.
pub const KEY_INDEX: &str = "idx";

/// Namespace prefix the index applies to its key-value store.
const NAMESPACE: &str = "/index";

type UpdateFn = Box<dyn Fn() + Send + Sync>;

/// Configuration for an [`Index`].
#[derive(Default)]
pub struct IndexOptions {
    bounds: Option<(u64, u64)>,
    update_func: Option<UpdateFn>,
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upper and lower byte thresholds of the LFU store.
    ///
    /// Once held content exceeds `upper`, eviction shrinks it back to
    /// `lower`; the interval between the two keeps writes from evicting
    /// every time the cache is full. `upper < lower` is rejected when the
    /// index is constructed.
    pub fn bounds(mut self, upper: u64, lower: u64) -> Self {
        self.bounds = Some((upper, lower));
        self
    }

    /// Sets a hook invoked after every committed read.
    ///
    /// The surrounding system uses it to kick interest refreshes; it is
    /// purely advisory and runs outside the index locks.
    pub fn update_func<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.update_func = Some(Box::new(f));
        self
    }
}

/// State of locally held content. One mutex covers all of it so size
/// accounting, bucket moves and map updates are observed atomically.
struct Held {
    root: Node,
    root_cid: Option<ContentId>,
    refs: HashMap<ContentId, ContentRef>,
    list: BucketList,
    size: u64,
}

/// Remote content we do not hold, ordered by aggregated remote frequency.
struct Interest {
    refs: HashMap<ContentId, ContentRef>,
    freqs: BucketList,
}

/// The content index: which DAGs this node holds, how often they are read,
/// and which remote content would be worth fetching.
///
/// Held records live in a persistent map rooted at a content id; the root is
/// written to the key-value store under [`KEY_INDEX`] on every mutation, so
/// an index reconstructed from the same store resumes where it left off. An
/// in-memory bucket list keeps records in least-to-most-frequent order for
/// O(1) reads and front-scan eviction.
///
/// Lock order is interest before held; held operations never take the
/// interest lock while holding their own.
pub struct Index {
    kv: Arc<dyn KvStore>,
    bstore: Arc<KvBlockStore>,
    ms: Arc<MultiStore>,
    /// Store usage above which eviction starts.
    ub: u64,
    /// Size eviction shrinks to, leaving headroom before the next round.
    lb: u64,
    update_func: Option<UpdateFn>,
    held: Mutex<Held>,
    interest: Mutex<Interest>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index").finish_non_exhaustive()
    }
}

impl Index {
    /// Opens an index over a key-value store and multi-store, loading any
    /// previously persisted records into the frequency list.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidBounds`] for a bounds configuration with
    /// `upper < lower`, or [`IndexError::Load`] when the persisted root
    /// cannot be read back.
    pub fn new(
        kv: Arc<dyn KvStore>,
        ms: Arc<MultiStore>,
        options: IndexOptions,
    ) -> Result<Self, IndexError> {
        let (ub, lb) = options.bounds.unwrap_or((0, 0));
        if ub < lb {
            return Err(IndexError::InvalidBounds {
                upper: ub,
                lower: lb,
            });
        }

        let kv: Arc<dyn KvStore> = Arc::new(Namespaced::new(kv, NAMESPACE));
        let bstore = Arc::new(KvBlockStore::new(kv.clone()));

        let mut held = Held {
            root: Node::new(),
            root_cid: None,
            refs: HashMap::new(),
            list: BucketList::new(),
            size: 0,
        };

        let persisted = kv
            .get(KEY_INDEX)
            .map_err(|e| IndexError::Load(HamtError::Store(e)))?;
        if let Some(enc) = persisted {
            let root_cid = ContentId::from_slice(&enc)
                .map_err(|_| IndexError::Load(HamtError::InvalidNode("bad root cid")))?;
            held.root = Node::load(bstore.as_ref(), &root_cid).map_err(IndexError::Load)?;
            held.root_cid = Some(root_cid);

            let mut records = Vec::new();
            held.root
                .for_each(bstore.as_ref(), &mut |_, raw| {
                    records.push(ContentRef::decode(raw).map_err(HamtError::from)?);
                    Ok(())
                })
                .map_err(IndexError::Load)?;
            for record in records {
                held.size += record.payload_size;
                Self::place_by_bucket_id(&mut held.list, &mut held.refs, record);
            }
            tracing::debug!(
                "Loaded index with {} refs ({} bytes)",
                held.refs.len(),
                held.size
            );
        }

        Ok(Self {
            kv,
            bstore,
            ms,
            ub,
            lb,
            update_func: options.update_func,
            held: Mutex::new(held),
            interest: Mutex::new(Interest {
                refs: HashMap::new(),
                freqs: BucketList::new(),
            }),
        })
    }

    /// Re-inserts a loaded record into the list, keeping bucket ids strictly
    /// ascending front to back.
    fn place_by_bucket_id(
        list: &mut BucketList,
        refs: &mut HashMap<ContentId, ContentRef>,
        mut record: ContentRef,
    ) {
        let slot = match list.front() {
            None => list.push_front(record.bucket_id),
            Some(front) => {
                let mut cursor = Some(front);
                let mut placed = None;
                while let Some(slot) = cursor {
                    let label = list.label(slot);
                    if label == record.bucket_id {
                        placed = Some(slot);
                        break;
                    }
                    if label > record.bucket_id {
                        placed = Some(list.insert_before(slot, record.bucket_id));
                        break;
                    }
                    cursor = list.next(slot);
                }
                placed.unwrap_or_else(|| list.push_back(record.bucket_id))
            }
        };
        list.add_entry(slot, record.payload_cid);
        record.slot = Some(slot);
        refs.insert(record.payload_cid, record);
    }

    /// The block store holding the persistent map nodes, for serving index
    /// data to peers.
    pub fn bstore(&self) -> &Arc<KvBlockStore> {
        &self.bstore
    }

    /// Current persistent map root, or `None` before the first flush.
    pub fn root(&self) -> Option<ContentId> {
        self.held.lock().root_cid
    }

    /// Storage capacity still advertised, or 0 if full.
    ///
    /// Capacity is only advertised while it exceeds the eviction headroom
    /// `upper - lower`, which keeps the node from thrashing right at the
    /// boundary.
    pub fn available(&self) -> u64 {
        let held = self.held.lock();
        self.available_locked(&held)
    }

    fn available_locked(&self, held: &Held) -> u64 {
        let margin = self.ub - self.lb;
        let avail = self.ub.saturating_sub(held.size);
        if avail > margin {
            avail
        } else {
            0
        }
    }

    /// Accumulated size in bytes of all held content.
    pub fn size(&self) -> u64 {
        self.held.lock().size
    }

    /// Number of content roots currently held.
    pub fn len(&self) -> usize {
        self.held.lock().refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a record for freshly committed content and persists the map.
    ///
    /// If bounds are configured and the new accumulated size exceeds the
    /// upper bound, eviction runs first (under the same lock, so the insert
    /// and eviction are observed atomically). In-memory state commits before
    /// the flush: if the flush fails the on-disk root is stale until the
    /// next successful write.
    pub fn set_ref(&self, record: ContentRef) -> Result<(), IndexError> {
        let cid = record.payload_cid;
        {
            let mut guard = self.held.lock();
            let held = &mut *guard;

            // replacing an existing key retires its old entry first
            if let Some(old) = held.refs.remove(&cid) {
                if let Some(slot) = old.slot {
                    held.list.remove_entry(slot, &cid);
                }
                held.size -= old.payload_size;
            }

            let mut record = record;
            record.slot = None;
            held.size += record.payload_size;
            held.refs.insert(cid, record);

            if self.ub > 0 && self.lb > 0 && held.size > self.ub {
                let target = held.size - self.lb;
                self.evict(held, target);
            }

            Self::increment_record(held, cid);
            if let Some(r) = held.refs.get(&cid) {
                let raw = r.encode()?;
                held.root
                    .set(self.bstore.as_ref(), &cid.to_hex(), Bytes::from(raw))
                    .map_err(IndexError::Persist)?;
            }
            self.flush_root(held)?;
        }
        // a key we now hold is no longer interesting
        self.forget_interest(&cid);
        Ok(())
    }

    /// Returns a held record, counting the access.
    ///
    /// The new frequency is written back to the persistent map so it
    /// survives a restart.
    pub fn get_ref(&self, cid: &ContentId) -> Result<ContentRef, IndexError> {
        let record = {
            let mut guard = self.held.lock();
            let held = &mut *guard;
            if !held.refs.contains_key(cid) {
                return Err(IndexError::RefNotFound);
            }
            Self::increment_record(held, *cid);
            let record = match held.refs.get(cid) {
                Some(r) => r.clone(),
                None => return Err(IndexError::RefNotFound),
            };
            let raw = record.encode()?;
            held.root
                .set(self.bstore.as_ref(), &cid.to_hex(), Bytes::from(raw))
                .map_err(IndexError::Persist)?;
            self.flush_root(held)?;
            record
        };
        if let Some(f) = &self.update_func {
            f();
        }
        Ok(record)
    }

    /// Returns a held record without registering a read.
    pub fn peek_ref(&self, cid: &ContentId) -> Result<ContentRef, IndexError> {
        self.held
            .lock()
            .refs
            .get(cid)
            .cloned()
            .ok_or(IndexError::RefNotFound)
    }

    /// Sub-store id backing a held content root. Counts as a read.
    pub fn store_id(&self, cid: &ContentId) -> Result<StoreId, IndexError> {
        Ok(self.get_ref(cid)?.store_id)
    }

    /// Resolves the sub-store holding a content root's blocks.
    pub fn store(&self, cid: &ContentId) -> Result<Arc<SubStore>, IndexError> {
        let id = self.store_id(cid)?;
        Ok(self.ms.get(id)?)
    }

    /// Removes a record, its persistent map entry and its sub-store.
    ///
    /// The fallible steps run before the record is erased: the map delete
    /// first (nothing irreversible has happened if it fails), then the
    /// sub-store delete. A failure leaves the record in place so the drop
    /// can be retried.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::RefNotFound`] if the key is not held.
    pub fn drop_ref(&self, cid: &ContentId) -> Result<(), IndexError> {
        let mut guard = self.held.lock();
        let held = &mut *guard;

        let Some(store_id) = held.refs.get(cid).map(|r| r.store_id) else {
            return Err(IndexError::RefNotFound);
        };

        // a retry after a failed attempt may find the key already gone from
        // the loaded tree, so the result is not taken as absence
        held.root
            .delete(self.bstore.as_ref(), &cid.to_hex())
            .map_err(IndexError::Persist)?;
        self.ms.delete(store_id)?;

        if let Some(record) = held.refs.remove(cid) {
            if let Some(slot) = record.slot {
                held.list.remove_entry(slot, cid);
            }
            held.size -= record.payload_size;
        }

        self.flush_root(held)
    }

    /// All held records in least-to-most-frequent order.
    ///
    /// Records of equal standing come back in insertion order.
    pub fn list_refs(&self) -> Vec<ContentRef> {
        let held = self.held.lock();
        let mut out = Vec::with_capacity(held.refs.len());
        let mut cursor = held.list.front();
        while let Some(slot) = cursor {
            for cid in held.list.entries(slot) {
                if let Some(record) = held.refs.get(cid) {
                    out.push(record.clone());
                }
            }
            cursor = held.list.next(slot);
        }
        out
    }

    /// Moves a record one bucket forward, creating the bucket if needed.
    ///
    /// Frequency starts at 0 and only increments once the record is already
    /// in the list: the first insertion is not an access.
    fn increment_record(held: &mut Held, cid: ContentId) {
        let current = held.refs.get(&cid).and_then(|r| r.slot);

        let (next_id, anchor) = match current {
            None => match held.list.back() {
                Some(back) => (held.list.label(back), Some(back)),
                None => (1, None),
            },
            Some(cur) => (held.list.label(cur) + 1, held.list.next(cur)),
        };

        let target = match anchor {
            Some(a) if held.list.label(a) == next_id => a,
            _ => match current {
                Some(cur) => held.list.insert_after(cur, next_id),
                None => held.list.push_front(next_id),
            },
        };

        if let Some(record) = held.refs.get_mut(&cid) {
            if current.is_some() {
                record.freq += 1;
            }
            record.bucket_id = next_id;
            record.slot = Some(target);
        }
        held.list.add_entry(target, cid);
        if let Some(cur) = current {
            held.list.remove_entry(cur, &cid);
        }
    }

    /// Evicts records from the least-frequent end until `target` bytes are
    /// reclaimed. Runs inside the caller's held lock.
    ///
    /// Both deletes are best-effort and ordered so nothing irreversible
    /// precedes a fallible step: the victim's key is deleted from the
    /// persistent map first, then its sub-store. A failure of either skips
    /// the record, leaving it in the index; a key already deleted from the
    /// map on an earlier attempt is not an error, so skipped victims are
    /// retried by later eviction rounds.
    fn evict(&self, held: &mut Held, target: u64) -> u64 {
        let mut evicted = 0u64;
        let mut cursor = held.list.front();
        while let Some(slot) = cursor {
            if evicted >= target {
                break;
            }
            let next = held.list.next(slot);
            let victims: Vec<ContentId> = held.list.entries(slot).to_vec();
            for cid in victims {
                if evicted >= target {
                    break;
                }
                let Some(store_id) = held.refs.get(&cid).map(|r| r.store_id) else {
                    continue;
                };
                if let Err(e) = held.root.delete(self.bstore.as_ref(), &cid.to_hex()) {
                    tracing::warn!("Eviction keeping {}: map delete failed: {}", cid, e);
                    continue;
                }
                if let Err(e) = self.ms.delete(store_id) {
                    tracing::warn!("Eviction keeping {}: sub-store delete failed: {}", cid, e);
                    continue;
                }
                if let Some(record) = held.refs.remove(&cid) {
                    held.list.remove_entry(slot, &cid);
                    held.size -= record.payload_size;
                    evicted += record.payload_size;
                }
            }
            cursor = next;
        }
        tracing::debug!("Evicted {} of {} requested bytes", evicted, target);
        evicted
    }

    /// Persists the map and writes the new root under [`KEY_INDEX`].
    fn flush_root(&self, held: &mut Held) -> Result<(), IndexError> {
        let root_cid = held
            .root
            .flush(self.bstore.as_ref())
            .map_err(IndexError::Persist)?;
        held.root_cid = Some(root_cid);
        self.kv
            .put(KEY_INDEX, Bytes::copy_from_slice(root_cid.as_bytes()))
            .map_err(|e| IndexError::Persist(HamtError::Store(e)))?;
        Ok(())
    }

    // ---------- interest ----------

    /// Loads a remote index root and merges its records into the interest
    /// list, most popular at the back.
    ///
    /// Keys this node already holds are skipped; the held lock is taken per
    /// key and released before the merge continues. Re-loading the same root
    /// sums frequencies again; entries whose frequency would not change are
    /// left where they are.
    pub fn load_interest(
        &self,
        root: ContentId,
        store: &dyn BlockStore,
    ) -> Result<(), IndexError> {
        let node = Node::load(store, &root).map_err(IndexError::Load)?;
        let mut records = Vec::new();
        node.for_each(store, &mut |_, raw| {
            records.push(ContentRef::decode(raw).map_err(HamtError::from)?);
            Ok(())
        })
        .map_err(IndexError::Load)?;

        let mut interest = self.interest.lock();
        for record in records {
            let cid = record.payload_cid;
            let already_held = { self.held.lock().refs.contains_key(&cid) };
            if already_held {
                continue;
            }
            Self::merge_interest(&mut interest, record);
        }
        Ok(())
    }

    /// Places or moves one remote record by its aggregated frequency.
    fn merge_interest(interest: &mut Interest, incoming: ContentRef) {
        let cid = incoming.payload_cid;

        if let Some(existing) = interest.refs.get(&cid) {
            let next_freq = existing.freq + incoming.freq;
            // a node may report content with zero reads; nothing to move
            if next_freq == existing.freq {
                return;
            }
            let Some(cur) = existing.slot else {
                return;
            };
            let mut cursor = Some(cur);
            let mut placed = None;
            while let Some(slot) = cursor {
                let label = interest.freqs.label(slot);
                if label == next_freq {
                    placed = Some(slot);
                    break;
                }
                if label > next_freq {
                    placed = Some(interest.freqs.insert_before(slot, next_freq));
                    break;
                }
                cursor = interest.freqs.next(slot);
            }
            let target = placed.unwrap_or_else(|| interest.freqs.push_back(next_freq));
            interest.freqs.add_entry(target, cid);
            // removal is deferred so the walk could start from the old bucket
            interest.freqs.remove_entry(cur, &cid);
            if let Some(record) = interest.refs.get_mut(&cid) {
                record.freq = next_freq;
                record.slot = Some(target);
            }
            return;
        }

        let mut record = incoming;
        let mut cursor = interest.freqs.front();
        let mut placed = None;
        while let Some(slot) = cursor {
            let label = interest.freqs.label(slot);
            if label == record.freq {
                placed = Some(slot);
                break;
            }
            if label > record.freq {
                placed = Some(interest.freqs.insert_before(slot, record.freq));
                break;
            }
            cursor = interest.freqs.next(slot);
        }
        let target = placed.unwrap_or_else(|| interest.freqs.push_back(record.freq));
        interest.freqs.add_entry(target, cid);
        record.slot = Some(target);
        interest.refs.insert(cid, record);
    }

    /// Picks remote records worth fetching.
    ///
    /// With capacity available, takes from the most-interesting end until
    /// the collected sizes cover it (possibly less if the list runs out).
    /// When full, offers a single swap candidate if the most interesting
    /// remote bucket beats the least-read held record.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NothingInteresting`] when full and no remote
    /// record beats the held front.
    pub fn interesting(&self) -> Result<Vec<ContentRef>, IndexError> {
        let interest = self.interest.lock();
        let available = self.available();

        if available > 0 {
            let mut out = Vec::new();
            let mut added = 0u64;
            let mut cursor = interest.freqs.back();
            'filling: while let Some(slot) = cursor {
                for cid in interest.freqs.entries(slot) {
                    if let Some(record) = interest.refs.get(cid) {
                        out.push(record.clone());
                        added += record.payload_size;
                        if added >= available {
                            break 'filling;
                        }
                    }
                }
                cursor = interest.freqs.prev(slot);
            }
            // may not be enough to fill all the space and that's fine
            return Ok(out);
        }

        let Some(back) = interest.freqs.back() else {
            return Err(IndexError::NothingInteresting);
        };
        let front_min = {
            let held = self.held.lock();
            let Some(front) = held.list.front() else {
                return Err(IndexError::NothingInteresting);
            };
            held.list
                .entries(front)
                .iter()
                .filter_map(|cid| held.refs.get(cid))
                .map(|record| record.freq)
                .min()
        };
        if let Some(min) = front_min {
            if interest.freqs.label(back) > min {
                if let Some(record) = interest
                    .freqs
                    .entries(back)
                    .first()
                    .and_then(|cid| interest.refs.get(cid))
                {
                    return Ok(vec![record.clone()]);
                }
            }
        }
        Err(IndexError::NothingInteresting)
    }

    /// Removes a record from the interest list.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::RefNotFound`] if the key is not tracked.
    pub fn drop_interest(&self, cid: &ContentId) -> Result<(), IndexError> {
        let mut interest = self.interest.lock();
        let record = interest
            .refs
            .remove(cid)
            .ok_or(IndexError::RefNotFound)?;
        if let Some(slot) = record.slot {
            interest.freqs.remove_entry(slot, cid);
        }
        Ok(())
    }

    /// Number of remote records currently tracked as interesting.
    pub fn interest_len(&self) -> usize {
        self.interest.lock().refs.len()
    }

    /// Silently drops an interest entry once its key becomes held.
    fn forget_interest(&self, cid: &ContentId) {
        let mut interest = self.interest.lock();
        if let Some(record) = interest.refs.remove(cid) {
            if let Some(slot) = record.slot {
                interest.freqs.remove_entry(slot, cid);
            }
        }
    }

    /// Checks the held-state invariants: list consistency, every record in
    /// exactly one bucket with a live back-pointer, and size accounting.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let held = self.held.lock();
        held.list.debug_validate_invariants();

        let mut listed = 0usize;
        let mut cursor = held.list.front();
        while let Some(slot) = cursor {
            for cid in held.list.entries(slot) {
                let record = held.refs.get(cid).expect("list entry without record");
                assert_eq!(record.slot, Some(slot), "stale back-pointer");
                assert_eq!(
                    record.bucket_id,
                    held.list.label(slot),
                    "bucket id mismatch"
                );
                listed += 1;
            }
            cursor = held.list.next(slot);
        }
        assert_eq!(listed, held.refs.len(), "record not in exactly one bucket");

        let total: u64 = held.refs.values().map(|r| r.payload_size).sum();
        assert_eq!(total, held.size, "size accounting drift");
    }
}
