//! hoard - Content index and cache core for a peer-to-peer content exchange node
//!
//! Peers stage content into local transactions, commit them to a
//! content-addressed store, and later retrieve them locally or from the
//! network. Because local storage is bounded, this crate maintains the
//! persistent index at the center of that flow: it maps content identifiers
//! to store locations and metadata, evicts the least-read content when
//! capacity runs out, and tracks popular remote content worth fetching next.
//!
//! # Modules
//!
//! - [`index`] - Held and interest indices, LFU bucket list, eviction & GC
//! - [`hamt`] - Persistent hash-array-mapped trie rooting the index
//! - [`stat`] - DAG traversal reporting size and block count
//! - [`dag`] - DAG node wire format
//! - [`store`] - Block store, key-value store and multi-store collaborators
//! - [`cbor`] - Canonical CBOR subset codec
//! - [`cid`] - SHA-256 content identifiers

pub mod cbor;
pub mod cid;
pub mod dag;
pub mod hamt;
pub mod index;
pub mod stat;
pub mod store;

pub use cbor::{CborError, Value};
pub use cid::{CidError, ContentId};
pub use dag::{DagError, DagNode};
pub use hamt::{HamtError, Node};
pub use index::{BucketList, BucketSlot, ContentRef, Index, IndexError, IndexOptions, KEY_INDEX};
pub use stat::{stat, DagStat, Selector, StatError};
pub use store::{
    BlockStore, KvBlockStore, KvStore, MemoryBlockStore, MemoryKvStore, MultiStore, Namespaced,
    StoreError, StoreId, SubStore,
};
