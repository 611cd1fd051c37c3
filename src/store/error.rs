use thiserror::Error;

use crate::cid::ContentId;
use crate::store::StoreId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("block not found: {0}")]
    BlockNotFound(ContentId),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("store not found: {0}")]
    StoreNotFound(StoreId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
