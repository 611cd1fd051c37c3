//! DAG node wire format
//!
//! Committed content is a DAG of blocks: each block is a CBOR map holding the
//! content ids of its children plus an opaque payload. The stat walker
//! traverses this shape; transactions produce it when committing files.

use bytes::Bytes;
use thiserror::Error;

use crate::cbor::{self, CborError, Value};
use crate::cid::ContentId;
use crate::store::{BlockStore, StoreError};

#[derive(Debug, Error)]
pub enum DagError {
    #[error("codec: {0}")]
    Codec(#[from] CborError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("invalid dag node: {0}")]
    InvalidNode(&'static str),
}

/// One node of a content DAG: child links plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagNode {
    pub links: Vec<ContentId>,
    pub data: Bytes,
}

impl DagNode {
    /// Creates a leaf node carrying only payload bytes.
    pub fn leaf(data: Bytes) -> Self {
        Self {
            links: Vec::new(),
            data,
        }
    }

    /// Creates an interior node linking to children.
    pub fn parent(links: Vec<ContentId>, data: Bytes) -> Self {
        Self { links, data }
    }

    /// Serializes the node to its canonical block bytes.
    pub fn encode(&self) -> Result<Vec<u8>, DagError> {
        let links = self
            .links
            .iter()
            .map(|cid| Value::bytes(cid.as_bytes()))
            .collect();
        let value = Value::Map(vec![
            ("links".to_string(), Value::Array(links)),
            ("data".to_string(), Value::Bytes(self.data.clone())),
        ]);
        Ok(cbor::encode(&value)?)
    }

    /// Decodes a node from block bytes.
    pub fn decode(data: &[u8]) -> Result<Self, DagError> {
        let value = cbor::decode(data)?;
        let links = value
            .get("links")
            .and_then(Value::as_array)
            .ok_or(DagError::InvalidNode("missing links"))?;
        let payload = value
            .get("data")
            .and_then(Value::as_bytes)
            .ok_or(DagError::InvalidNode("missing data"))?;

        let mut out = Vec::with_capacity(links.len());
        for link in links {
            let bytes = link
                .as_bytes()
                .ok_or(DagError::InvalidNode("bad link"))?;
            let cid = ContentId::from_slice(bytes)
                .map_err(|_| DagError::InvalidNode("bad link"))?;
            out.push(cid);
        }
        Ok(Self {
            links: out,
            data: payload.clone(),
        })
    }

    /// Encodes the node and stores it, returning its content id.
    pub fn put(&self, store: &dyn BlockStore) -> Result<ContentId, DagError> {
        let bytes = self.encode()?;
        Ok(store.put(Bytes::from(bytes))?)
    }
}
