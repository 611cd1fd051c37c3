use thiserror::Error;

/// Errors that can occur during CBOR encoding or decoding.
///
/// # Examples
///
/// ```
/// use hoard::cbor::{decode, CborError};
///
/// // Truncated input
/// let result = decode(&[0x58]);
/// assert!(matches!(result, Err(CborError::UnexpectedEof)));
///
/// // Trailing data
/// let result = decode(&[0x00, 0x00]);
/// assert!(matches!(result, Err(CborError::TrailingData)));
/// ```
#[derive(Debug, Error)]
pub enum CborError {
    /// Input ended before a complete value was parsed.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A major type or additional-info encoding outside the supported subset.
    #[error("unsupported cbor item: major type {major}, info {info}")]
    Unsupported { major: u8, info: u8 },

    /// An integer or length was not encoded in its shortest form.
    #[error("non-canonical length encoding")]
    NonCanonical,

    /// A text string or map key is not valid UTF-8.
    #[error("invalid utf-8 in text string")]
    InvalidUtf8,

    /// A map contains the same key twice.
    #[error("duplicate map key: {0}")]
    DuplicateKey(String),

    /// A declared length exceeds the remaining input.
    #[error("declared length exceeds input")]
    LengthOverflow,

    /// Recursion limit exceeded to prevent stack overflow.
    #[error("nesting too deep")]
    NestingTooDeep,

    /// Extra data exists after the value.
    #[error("trailing data after value")]
    TrailingData,

    /// A decoded structure is missing a field or has one of the wrong type.
    #[error("missing or invalid field: {0}")]
    Field(&'static str),

    /// I/O error during encoding.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
