//! Persistent hash-array-mapped trie
//!
//! The authenticated map backing the content index. Keys are strings hashed
//! with SHA-256 (rather than a weaker default, to resist collision attacks),
//! consumed 5 bits per level for a 32-way fanout. Leaves hold up to three
//! entries before sharding one level down; deletes collapse single-leaf
//! children so equal contents always serialize to equal roots.
//!
//! Nodes are serialized with the crate's canonical CBOR codec and persisted
//! through a content-addressed [`BlockStore`](crate::store::BlockStore);
//! [`Node::flush`] writes loaded subtrees bottom-up and returns the new root
//! content id.

mod error;
mod hash_bits;
mod node;

pub use error::HamtError;
pub use node::{Node, TREE_BIT_WIDTH};
