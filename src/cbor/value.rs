use bytes::Bytes;

/// A CBOR value.
///
/// Covers the subset of CBOR the crate serializes: unsigned integers, byte
/// strings, text strings, arrays, and maps with text keys. Map entries keep
/// the order they were written in; encoders define a fixed field order so
/// that equal values encode to equal bytes.
///
/// # Examples
///
/// ```
/// use hoard::cbor::Value;
///
/// let int = Value::Unsigned(42);
/// assert_eq!(int.as_unsigned(), Some(42));
///
/// let text: Value = "hello".into();
/// assert_eq!(text.as_str(), Some("hello"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// An unsigned 64-bit integer (major type 0).
    Unsigned(u64),
    /// A byte string (major type 2).
    Bytes(Bytes),
    /// A UTF-8 text string (major type 3).
    Text(String),
    /// An ordered array of values (major type 4).
    Array(Vec<Value>),
    /// A map with text keys in writer-defined order (major type 5).
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Creates a text value from a string slice.
    pub fn text(s: &str) -> Self {
        Value::Text(s.to_string())
    }

    /// Creates a byte string value from a slice.
    pub fn bytes(b: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(b))
    }

    /// Returns the value as an unsigned integer, if it is one.
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Value::Unsigned(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a byte string, if it is one.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the value as a text string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the map entries in encoded order, if the value is a map.
    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Looks up a key in this value if it is a map.
    ///
    /// Returns `None` if the value is not a map or the key is absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Unsigned(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}
