//! Block, key-value and multi-store collaborators
//!
//! The index persists through three storage interfaces: a content-addressed
//! [`BlockStore`] holding raw blocks by their [`ContentId`](crate::ContentId),
//! a flat [`KvStore`] holding the well-known index root key, and a
//! [`MultiStore`] handing out one [`SubStore`] per committed DAG so content
//! can be garbage collected by deleting its sub-store.
//!
//! In-memory implementations are provided; the index only depends on the
//! traits.

mod block;
mod error;
mod kv;
mod multi;

pub use block::{BlockStore, KvBlockStore, MemoryBlockStore};
pub use error::StoreError;
pub use kv::{KvStore, MemoryKvStore, Namespaced};
pub use multi::{MultiStore, StoreId, SubStore};
