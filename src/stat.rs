//! DAG size and block-count reporting
//!
//! A single traversal over a committed DAG, summing raw block bytes as each
//! link loads. External callers use it to size a record before handing it to
//! the index. The walker is stateless and re-entrant.

use std::collections::HashSet;

use thiserror::Error;

use crate::cbor::Value;
use crate::cid::ContentId;
use crate::dag::{DagError, DagNode};
use crate::store::{BlockStore, SubStore};

#[derive(Debug, Error)]
pub enum StatError {
    /// The selector expression does not describe a supported traversal.
    #[error("invalid selector: {0}")]
    SelectorInvalid(&'static str),

    /// A linked block could not be loaded or decoded.
    #[error("unable to load link {cid}: {source}")]
    LinkLoad {
        cid: ContentId,
        #[source]
        source: DagError,
    },
}

/// Size and block count of a traversed DAG.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DagStat {
    /// Sum of the raw sizes of the blocks visited.
    pub size: u64,
    /// Number of distinct blocks visited.
    pub num_blocks: usize,
}

/// Which part of a DAG a traversal covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Every block reachable from the root.
    All,
    /// Blocks up to `depth` links below the root (0 = root only).
    Depth(u64),
}

impl Selector {
    /// Parses a selector expression.
    ///
    /// `"all"` walks the full DAG; `{"depth": n}` bounds recursion depth.
    ///
    /// # Errors
    ///
    /// Returns [`StatError::SelectorInvalid`] for any other shape.
    pub fn parse(expr: &Value) -> Result<Self, StatError> {
        match expr {
            Value::Text(s) if s == "all" => Ok(Selector::All),
            Value::Map(entries) => {
                let [(key, value)] = entries.as_slice() else {
                    return Err(StatError::SelectorInvalid("expected one field"));
                };
                if key.as_str() != "depth" {
                    return Err(StatError::SelectorInvalid("unknown field"));
                }
                let depth = value
                    .as_unsigned()
                    .ok_or(StatError::SelectorInvalid("depth must be unsigned"))?;
                Ok(Selector::Depth(depth))
            }
            _ => Err(StatError::SelectorInvalid("expected \"all\" or a map")),
        }
    }

    fn admits(&self, depth: u64) -> bool {
        match self {
            Selector::All => true,
            Selector::Depth(limit) => depth <= *limit,
        }
    }
}

/// Walks the DAG rooted at `root` inside a sub-store and reports its size.
///
/// Each distinct block is counted once, even when linked from several
/// parents. Fails with [`StatError::LinkLoad`] if the root (or any selected
/// link) cannot be loaded.
pub fn stat(store: &SubStore, root: ContentId, selector: &Selector) -> Result<DagStat, StatError> {
    let mut result = DagStat::default();
    let mut visited = HashSet::new();
    walk(store.bstore().as_ref(), root, 0, selector, &mut visited, &mut result)?;
    Ok(result)
}

fn walk(
    bstore: &dyn BlockStore,
    cid: ContentId,
    depth: u64,
    selector: &Selector,
    visited: &mut HashSet<ContentId>,
    result: &mut DagStat,
) -> Result<(), StatError> {
    if !visited.insert(cid) {
        return Ok(());
    }

    let block = bstore
        .get(&cid)
        .map_err(|e| StatError::LinkLoad {
            cid,
            source: DagError::Store(e),
        })?;
    result.size += block.len() as u64;
    result.num_blocks += 1;

    let node = DagNode::decode(&block).map_err(|source| StatError::LinkLoad { cid, source })?;
    for link in node.links {
        if selector.admits(depth + 1) {
            walk(bstore, link, depth + 1, selector, visited, result)?;
        }
    }
    Ok(())
}
