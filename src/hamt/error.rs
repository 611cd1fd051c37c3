use thiserror::Error;

use crate::cbor::CborError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum HamtError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("codec: {0}")]
    Codec(#[from] CborError),

    /// The key hash was fully consumed without reaching a leaf.
    #[error("max trie depth exceeded")]
    MaxDepth,

    #[error("invalid node: {0}")]
    InvalidNode(&'static str),
}
