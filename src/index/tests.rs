use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::cid::ContentId;
use crate::store::{KvStore, MemoryKvStore, MultiStore};

fn setup() -> (Arc<MemoryKvStore>, Arc<MultiStore>) {
    (Arc::new(MemoryKvStore::new()), Arc::new(MultiStore::new()))
}

fn open(
    kv: &Arc<MemoryKvStore>,
    ms: &Arc<MultiStore>,
    options: IndexOptions,
) -> Index {
    let kv: Arc<dyn KvStore> = kv.clone();
    Index::new(kv, ms.clone(), options).expect("index construction")
}

/// Commits a fresh sub-store and returns a record for it.
fn committed(ms: &MultiStore, name: &str, size: u64) -> ContentRef {
    let store = ms.add();
    ContentRef::new(ContentId::of(name.as_bytes()), size, store.id())
}

#[test]
fn test_invalid_bounds_rejected() {
    let (kv, ms) = setup();
    let kv: Arc<dyn KvStore> = kv;
    let err = Index::new(kv, ms, IndexOptions::new().bounds(10, 20)).unwrap_err();
    assert!(matches!(
        err,
        IndexError::InvalidBounds {
            upper: 10,
            lower: 20
        }
    ));
}

#[test]
fn test_set_ref_with_zero_bounds() {
    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new().bounds(0, 0));

    let a = committed(&ms, "A", 100);
    let cid = a.payload_cid;
    idx.set_ref(a).unwrap();

    assert_eq!(idx.len(), 1);
    assert_eq!(idx.available(), 0);
    let refs = idx.list_refs();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].payload_cid, cid);
    idx.debug_validate_invariants();
}

#[test]
fn test_reads_reorder_by_frequency() {
    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new());

    let a = committed(&ms, "A", 100);
    let b = committed(&ms, "B", 100);
    let (cid_a, cid_b) = (a.payload_cid, b.payload_cid);
    idx.set_ref(a).unwrap();
    idx.set_ref(b).unwrap();

    idx.get_ref(&cid_a).unwrap();
    idx.get_ref(&cid_a).unwrap();
    idx.get_ref(&cid_b).unwrap();

    let refs = idx.list_refs();
    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0].payload_cid, cid_b);
    assert_eq!(refs[1].payload_cid, cid_a);
    assert_eq!(refs[0].freq, 1);
    assert_eq!(refs[1].freq, 2);
    idx.debug_validate_invariants();
}

#[test]
fn test_peek_does_not_count_a_read() {
    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new());

    let a = committed(&ms, "A", 100);
    let cid = a.payload_cid;
    idx.set_ref(a).unwrap();

    assert_eq!(idx.peek_ref(&cid).unwrap().freq, 0);
    assert_eq!(idx.peek_ref(&cid).unwrap().freq, 0);
    assert!(matches!(
        idx.peek_ref(&ContentId::of(b"missing")),
        Err(IndexError::RefNotFound)
    ));
}

#[test]
fn test_persisted_frequency_counts_reads() {
    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new());

    let a = committed(&ms, "A", 100);
    let cid = a.payload_cid;
    idx.set_ref(a).unwrap();
    for _ in 0..3 {
        idx.get_ref(&cid).unwrap();
    }
    assert_eq!(idx.peek_ref(&cid).unwrap().freq, 3);
    drop(idx);

    // the frequency survives reconstruction from the same store
    let reopened = open(&kv, &ms, IndexOptions::new());
    assert_eq!(reopened.peek_ref(&cid).unwrap().freq, 3);
}

#[test]
fn test_eviction_reclaims_least_frequent() {
    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new().bounds(250, 150));

    let a = committed(&ms, "A", 100);
    let b = committed(&ms, "B", 100);
    let c = committed(&ms, "C", 100);
    let (cid_a, cid_b, cid_c) = (a.payload_cid, b.payload_cid, c.payload_cid);
    let (store_a, store_b) = (a.store_id, b.store_id);

    idx.set_ref(a).unwrap();
    idx.set_ref(b).unwrap();
    // inserting C pushes the size to 300 > 250, evicting down to 150
    idx.set_ref(c).unwrap();

    assert_eq!(idx.len(), 1);
    assert_eq!(idx.size(), 100);
    assert!(matches!(idx.peek_ref(&cid_a), Err(IndexError::RefNotFound)));
    assert!(matches!(idx.peek_ref(&cid_b), Err(IndexError::RefNotFound)));
    assert_eq!(idx.peek_ref(&cid_c).unwrap().payload_size, 100);

    // the victims' sub-stores were garbage collected
    assert!(ms.get(store_a).is_err());
    assert!(ms.get(store_b).is_err());
    idx.debug_validate_invariants();

    // evicted keys are gone from the persisted map too
    drop(idx);
    let reopened = open(&kv, &ms, IndexOptions::new().bounds(250, 150));
    assert_eq!(reopened.len(), 1);
    assert!(matches!(
        reopened.peek_ref(&cid_a),
        Err(IndexError::RefNotFound)
    ));
}

#[test]
fn test_eviction_spares_frequently_read_content() {
    let (kv, ms) = setup();
    // lower bound of 200 makes the eviction target exactly one record
    let idx = open(&kv, &ms, IndexOptions::new().bounds(250, 200));

    let a = committed(&ms, "A", 100);
    let b = committed(&ms, "B", 100);
    let c = committed(&ms, "C", 100);
    let (cid_a, cid_b) = (a.payload_cid, b.payload_cid);

    idx.set_ref(a).unwrap();
    idx.set_ref(b).unwrap();
    // A moves to a higher bucket, so B is the least frequent
    idx.get_ref(&cid_a).unwrap();
    idx.set_ref(c).unwrap();

    assert!(idx.peek_ref(&cid_a).is_ok());
    assert!(matches!(idx.peek_ref(&cid_b), Err(IndexError::RefNotFound)));
    idx.debug_validate_invariants();
}

#[test]
fn test_drop_ref() {
    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new());

    let a = committed(&ms, "A", 100);
    let cid = a.payload_cid;
    let store_id = a.store_id;
    idx.set_ref(a).unwrap();

    idx.drop_ref(&cid).unwrap();
    assert_eq!(idx.len(), 0);
    assert_eq!(idx.size(), 0);
    assert!(ms.get(store_id).is_err());
    assert!(matches!(idx.drop_ref(&cid), Err(IndexError::RefNotFound)));
    idx.debug_validate_invariants();
}

#[test]
fn test_set_ref_replaces_existing_key() {
    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new());

    let first = committed(&ms, "A", 100);
    let cid = first.payload_cid;
    idx.set_ref(first).unwrap();

    let mut second = committed(&ms, "other", 250);
    second.payload_cid = cid;
    idx.set_ref(second).unwrap();

    assert_eq!(idx.len(), 1);
    assert_eq!(idx.size(), 250);
    assert_eq!(idx.peek_ref(&cid).unwrap().payload_size, 250);
    idx.debug_validate_invariants();
}

#[test]
fn test_available_keeps_eviction_headroom() {
    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new().bounds(250, 150));

    assert_eq!(idx.available(), 250);
    idx.set_ref(committed(&ms, "A", 100)).unwrap();
    assert_eq!(idx.available(), 150);
    // 50 bytes left is under the 100-byte headroom, so none is advertised
    idx.set_ref(committed(&ms, "B", 100)).unwrap();
    assert_eq!(idx.available(), 0);
}

#[test]
fn test_persistence_roundtrip() {
    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new());

    let mut cids = Vec::new();
    for (name, size) in [("A", 100), ("B", 200), ("C", 300)] {
        let record = committed(&ms, name, size);
        cids.push(record.payload_cid);
        idx.set_ref(record).unwrap();
    }
    idx.get_ref(&cids[1]).unwrap();
    idx.get_ref(&cids[1]).unwrap();

    let root = idx.root().expect("root after flush");
    let before = idx.list_refs();
    drop(idx);

    let reopened = open(&kv, &ms, IndexOptions::new());
    assert_eq!(reopened.root(), Some(root));
    assert_eq!(reopened.len(), 3);
    assert_eq!(reopened.size(), 600);

    let after = reopened.list_refs();
    assert_eq!(after.len(), before.len());
    // least-to-most-frequent order is preserved
    for window in after.windows(2) {
        assert!(window[0].freq <= window[1].freq);
        assert!(window[0].bucket_id <= window[1].bucket_id);
    }
    // and every record comes back field for field
    for record in &before {
        let restored = reopened.peek_ref(&record.payload_cid).unwrap();
        assert_eq!(restored.payload_size, record.payload_size);
        assert_eq!(restored.store_id, record.store_id);
        assert_eq!(restored.freq, record.freq);
        assert_eq!(restored.bucket_id, record.bucket_id);
    }
    reopened.debug_validate_invariants();
}

#[test]
fn test_update_func_fires_on_reads_only() {
    let (kv, ms) = setup();
    let reads = Arc::new(AtomicUsize::new(0));
    let counter = reads.clone();
    let idx = open(
        &kv,
        &ms,
        IndexOptions::new().update_func(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let a = committed(&ms, "A", 100);
    let cid = a.payload_cid;
    idx.set_ref(a).unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 0);

    idx.get_ref(&cid).unwrap();
    idx.get_ref(&cid).unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 2);

    idx.peek_ref(&cid).unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 2);
}

/// Builds a "remote" index holding the given (name, size, reads) contents
/// and returns it with its root.
fn remote_index(contents: &[(&str, u64, usize)]) -> (Index, ContentId) {
    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new());
    for (name, size, reads) in contents {
        let record = committed(&ms, name, *size);
        let cid = record.payload_cid;
        idx.set_ref(record).unwrap();
        for _ in 0..*reads {
            idx.get_ref(&cid).unwrap();
        }
    }
    let root = idx.root().expect("remote root");
    (idx, root)
}

#[test]
fn test_load_interest_merges_frequencies() {
    let (remote, root) = remote_index(&[("A", 100, 3), ("B", 100, 1)]);

    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new().bounds(1000, 100));

    idx.load_interest(root, remote.bstore().as_ref()).unwrap();
    assert_eq!(idx.interest_len(), 2);

    // interesting() fills available space, most interesting first
    let picks = idx.interesting().unwrap();
    assert_eq!(picks.len(), 2);
    assert_eq!(picks[0].payload_cid, ContentId::of(b"A"));
    assert_eq!(picks[0].freq, 3);
    assert_eq!(picks[1].freq, 1);

    // re-loading the same root sums the frequencies once more
    idx.load_interest(root, remote.bstore().as_ref()).unwrap();
    assert_eq!(idx.interest_len(), 2);
    let picks = idx.interesting().unwrap();
    assert_eq!(picks[0].freq, 6);
    assert_eq!(picks[1].freq, 2);
}

#[test]
fn test_interesting_respects_available_space() {
    let (remote, root) = remote_index(&[("A", 100, 3), ("B", 100, 1)]);

    // room for exactly one 100-byte record
    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new().bounds(100, 50));
    idx.load_interest(root, remote.bstore().as_ref()).unwrap();

    let picks = idx.interesting().unwrap();
    assert_eq!(picks.len(), 1);
    assert_eq!(picks[0].payload_cid, ContentId::of(b"A"));
}

#[test]
fn test_zero_frequency_interest_is_idempotent() {
    let (remote, root) = remote_index(&[("A", 100, 0), ("B", 100, 0)]);

    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new().bounds(1000, 100));
    idx.load_interest(root, remote.bstore().as_ref()).unwrap();
    idx.load_interest(root, remote.bstore().as_ref()).unwrap();

    assert_eq!(idx.interest_len(), 2);
    for record in idx.interesting().unwrap() {
        assert_eq!(record.freq, 0);
    }
}

#[test]
fn test_held_and_interest_stay_disjoint() {
    let (remote, root) = remote_index(&[("A", 100, 2), ("B", 100, 1)]);

    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new().bounds(1000, 500));

    // holding A up front means the interest load skips it
    let mut held_a = committed(&ms, "held-a", 100);
    held_a.payload_cid = ContentId::of(b"A");
    idx.set_ref(held_a).unwrap();
    idx.load_interest(root, remote.bstore().as_ref()).unwrap();
    assert_eq!(idx.interest_len(), 1);

    // acquiring B afterwards retires its interest entry
    let mut held_b = committed(&ms, "held-b", 100);
    held_b.payload_cid = ContentId::of(b"B");
    idx.set_ref(held_b).unwrap();
    assert_eq!(idx.interest_len(), 0);
    assert!(matches!(
        idx.interesting(),
        Ok(picks) if picks.is_empty()
    ));
}

#[test]
fn test_interesting_when_full_offers_swap_candidate() {
    let (remote, root) = remote_index(&[("hot", 100, 5)]);

    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new().bounds(200, 150));
    idx.set_ref(committed(&ms, "H1", 100)).unwrap();
    idx.set_ref(committed(&ms, "H2", 100)).unwrap();
    assert_eq!(idx.available(), 0);

    idx.load_interest(root, remote.bstore().as_ref()).unwrap();
    let picks = idx.interesting().unwrap();
    assert_eq!(picks.len(), 1);
    assert_eq!(picks[0].payload_cid, ContentId::of(b"hot"));
}

#[test]
fn test_interesting_when_nothing_beats_held_content() {
    let (remote, root) = remote_index(&[("lukewarm", 100, 0)]);

    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new().bounds(200, 150));
    idx.set_ref(committed(&ms, "H1", 100)).unwrap();
    idx.set_ref(committed(&ms, "H2", 100)).unwrap();
    idx.load_interest(root, remote.bstore().as_ref()).unwrap();

    assert!(matches!(
        idx.interesting(),
        Err(IndexError::NothingInteresting)
    ));
}

#[test]
fn test_drop_interest() {
    let (remote, root) = remote_index(&[("A", 100, 1)]);

    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new().bounds(1000, 100));
    idx.load_interest(root, remote.bstore().as_ref()).unwrap();

    let cid = ContentId::of(b"A");
    idx.drop_interest(&cid).unwrap();
    assert_eq!(idx.interest_len(), 0);
    assert!(matches!(
        idx.drop_interest(&cid),
        Err(IndexError::RefNotFound)
    ));
}

#[test]
fn test_concurrent_set_ref() {
    let (kv, ms) = setup();
    let idx = Arc::new(open(&kv, &ms, IndexOptions::new()));

    let mut handles = Vec::new();
    for t in 0..4 {
        let idx = idx.clone();
        let ms = ms.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..8 {
                let record = committed(&ms, &format!("content-{t}-{i}"), 100);
                idx.set_ref(record).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(idx.len(), 32);
    idx.debug_validate_invariants();

    // the persisted root decodes every record
    let root = idx.root().unwrap();
    drop(idx);
    let reopened = open(&kv, &ms, IndexOptions::new());
    assert_eq!(reopened.root(), Some(root));
    assert_eq!(reopened.len(), 32);
}

#[test]
fn test_bucket_invariants_under_random_operations() {
    use rand::{thread_rng, Rng};

    let (kv, ms) = setup();
    let idx = open(&kv, &ms, IndexOptions::new().bounds(5_000, 3_000));
    let mut rng = thread_rng();
    let mut alive: Vec<ContentId> = Vec::new();

    for step in 0..300 {
        match rng.gen_range(0..4u32) {
            0 => {
                let record = committed(&ms, &format!("content-{step}"), rng.gen_range(1..400));
                alive.push(record.payload_cid);
                idx.set_ref(record).unwrap();
            }
            1 | 2 if !alive.is_empty() => {
                let pick = alive[rng.gen_range(0..alive.len())];
                // reads may race with earlier evictions
                let _ = idx.get_ref(&pick);
            }
            3 if !alive.is_empty() => {
                let at = rng.gen_range(0..alive.len());
                let pick = alive.swap_remove(at);
                let _ = idx.drop_ref(&pick);
            }
            _ => {}
        }
        idx.debug_validate_invariants();
    }

    // the survivors reload into a consistent index
    drop(idx);
    let reopened = open(&kv, &ms, IndexOptions::new().bounds(5_000, 3_000));
    reopened.debug_validate_invariants();
}
