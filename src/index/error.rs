use thiserror::Error;

use crate::cbor::CborError;
use crate::hamt::HamtError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum IndexError {
    /// The requested content id is not in the index.
    #[error("ref not found")]
    RefNotFound,

    /// Construction rejected the configured capacity bounds.
    #[error("upper bound {upper} is lower than lower bound {lower}")]
    InvalidBounds { upper: u64, lower: u64 },

    /// The persistent map or root key could not be written.
    #[error("failed to persist index: {0}")]
    Persist(#[source] HamtError),

    /// The persistent map could not be read back.
    #[error("failed to load index: {0}")]
    Load(#[source] HamtError),

    /// A record failed to encode or decode.
    #[error("record codec: {0}")]
    Codec(#[from] CborError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// No remote content is worth fetching right now.
    #[error("nothing interesting")]
    NothingInteresting,
}
