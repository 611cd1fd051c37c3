//! Canonical CBOR encoding and decoding
//!
//! Self-delimiting binary encoding used for index records, persistent map
//! nodes and DAG nodes. Only the types those structures need are supported:
//! unsigned integers, byte strings, text strings, arrays, and maps with text
//! keys in writer-defined order. Encoding is canonical (definite lengths,
//! shortest-form heads) so equal values always produce equal bytes.

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode;
pub use encode::encode;
pub use error::CborError;
pub use value::Value;
