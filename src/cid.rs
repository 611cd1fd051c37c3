//! Content identifiers
//!
//! A [`ContentId`] is the 32-byte SHA-256 digest addressing a block or a DAG
//! root. Blocks are stored and retrieved by their content id, and the
//! persistent map is rooted at one.

use std::fmt;

use thiserror::Error;

/// Errors from parsing a content id.
#[derive(Debug, Error)]
pub enum CidError {
    /// The input is not exactly 32 bytes (64 hex characters).
    #[error("invalid content id length")]
    InvalidLength,
}

/// A content-addressed identifier (32-byte SHA-256).
///
/// # Examples
///
/// ```
/// use hoard::ContentId;
///
/// let id = ContentId::of(b"hello");
/// assert_eq!(id.as_bytes().len(), 32);
///
/// let parsed = ContentId::from_hex(&id.to_hex()).unwrap();
/// assert_eq!(parsed, id);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(pub [u8; 32]);

impl ContentId {
    /// Creates a content id from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Creates a content id from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`CidError::InvalidLength`] if the slice is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CidError> {
        if bytes.len() != 32 {
            return Err(CidError::InvalidLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Computes the content id of a blob of data.
    pub fn of(data: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(data);
        let hash: [u8; 32] = hasher.finalize().into();
        Self(hash)
    }

    /// Parses a content id from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CidError> {
        if s.len() != 64 {
            return Err(CidError::InvalidLength);
        }
        let bytes = hex_decode(s).ok_or(CidError::InvalidLength)?;
        Self::from_slice(&bytes)
    }

    /// Returns the raw bytes of the content id.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Converts to a lowercase hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.to_hex())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
