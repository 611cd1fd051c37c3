use sha2::{Digest, Sha256};

use super::error::HamtError;
use super::node::TREE_BIT_WIDTH;

/// Consumes a key's SHA-256 digest a few bits at a time, MSB first.
pub(crate) struct HashBits {
    hash: [u8; 32],
    consumed: u32,
}

impl HashBits {
    pub fn new(key: &str) -> Self {
        Self::resume(key, 0)
    }

    /// Starts a cursor with `consumed` bits already spent, for re-inserting
    /// entries one level below their previous position.
    pub fn resume(key: &str, consumed: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        Self {
            hash: hasher.finalize().into(),
            consumed,
        }
    }

    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    /// Returns the next `TREE_BIT_WIDTH` bits of the digest.
    pub fn next(&mut self) -> Result<u32, HamtError> {
        if self.consumed + TREE_BIT_WIDTH > 256 {
            return Err(HamtError::MaxDepth);
        }
        let mut out = 0u32;
        for _ in 0..TREE_BIT_WIDTH {
            let byte = (self.consumed / 8) as usize;
            let bit = 7 - (self.consumed % 8);
            out = (out << 1) | ((self.hash[byte] >> bit) & 1) as u32;
            self.consumed += 1;
        }
        Ok(out)
    }
}
