//! Content index with LFU eviction
//!
//! The heart of the node: a persistent map of held content combined with an
//! in-memory least-frequently-used ordering, a size accountant with upper and
//! lower byte bounds, and a mirror structure tracking *interest*, the popular
//! remote content this node does not hold yet.
//!
//! # Components
//!
//! - [`Index`] - held and interest state behind two independent locks
//! - [`ContentRef`] - one committed content DAG (id, size, store, frequency)
//! - [`IndexOptions`] - capacity bounds and the read-commit hook
//! - [`BucketList`] - the intrusive frequency-bucket list both halves share

mod buckets;
mod error;
mod manager;
mod record;

pub use buckets::{BucketList, BucketSlot};
pub use error::IndexError;
pub use manager::{Index, IndexOptions, KEY_INDEX};
pub use record::ContentRef;

#[cfg(test)]
mod tests;
