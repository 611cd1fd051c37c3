use bytes::Bytes;

use super::error::CborError;
use super::value::Value;

const MAX_DEPTH: usize = 64;

/// Decodes a CBOR value from a byte slice.
///
/// The input must contain exactly one complete value with no trailing data.
/// Decoding is strict: indefinite lengths, unsupported major types, and
/// non-shortest-form heads are rejected, so any bytes that decode also
/// re-encode to the same bytes.
///
/// # Errors
///
/// Returns an error if:
/// - The input is empty or truncated ([`CborError::UnexpectedEof`])
/// - The input uses an unsupported or indefinite encoding
///   ([`CborError::Unsupported`])
/// - A head is not in shortest form ([`CborError::NonCanonical`])
/// - The nesting depth exceeds 64 levels ([`CborError::NestingTooDeep`])
/// - There is data after the value ([`CborError::TrailingData`])
///
/// # Examples
///
/// ```
/// use hoard::cbor::decode;
///
/// let int = decode(&[0x18, 0x2a]).unwrap();
/// assert_eq!(int.as_unsigned(), Some(42));
///
/// let text = decode(&[0x63, b'h', b'e', b'y']).unwrap();
/// assert_eq!(text.as_str(), Some("hey"));
/// ```
pub fn decode(data: &[u8]) -> Result<Value, CborError> {
    let mut pos = 0;
    let value = decode_value(data, &mut pos, 0)?;

    if pos != data.len() {
        return Err(CborError::TrailingData);
    }

    Ok(value)
}

fn decode_value(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value, CborError> {
    if depth > MAX_DEPTH {
        return Err(CborError::NestingTooDeep);
    }

    let (major, arg) = read_head(data, pos)?;
    match major {
        0 => Ok(Value::Unsigned(arg)),
        2 => {
            let bytes = read_exact(data, pos, arg)?;
            Ok(Value::Bytes(Bytes::copy_from_slice(bytes)))
        }
        3 => {
            let bytes = read_exact(data, pos, arg)?;
            let text = std::str::from_utf8(bytes).map_err(|_| CborError::InvalidUtf8)?;
            Ok(Value::Text(text.to_string()))
        }
        4 => {
            let mut items = Vec::new();
            for _ in 0..arg {
                items.push(decode_value(data, pos, depth + 1)?);
            }
            Ok(Value::Array(items))
        }
        5 => {
            let mut entries: Vec<(String, Value)> = Vec::new();
            for _ in 0..arg {
                let key = decode_key(data, pos)?;
                if entries.iter().any(|(k, _)| *k == key) {
                    return Err(CborError::DuplicateKey(key));
                }
                let value = decode_value(data, pos, depth + 1)?;
                entries.push((key, value));
            }
            Ok(Value::Map(entries))
        }
        _ => Err(CborError::Unsupported { major, info: 0 }),
    }
}

fn decode_key(data: &[u8], pos: &mut usize) -> Result<String, CborError> {
    let (major, arg) = read_head(data, pos)?;
    if major != 3 {
        return Err(CborError::Unsupported { major, info: 0 });
    }
    let bytes = read_exact(data, pos, arg)?;
    let key = std::str::from_utf8(bytes).map_err(|_| CborError::InvalidUtf8)?;
    Ok(key.to_string())
}

fn read_head(data: &[u8], pos: &mut usize) -> Result<(u8, u64), CborError> {
    if *pos >= data.len() {
        return Err(CborError::UnexpectedEof);
    }

    let initial = data[*pos];
    *pos += 1;
    let major = initial >> 5;
    let info = initial & 0x1f;

    let arg = match info {
        0..=23 => info as u64,
        24 => {
            let b = read_exact(data, pos, 1)?;
            let v = b[0] as u64;
            if v < 24 {
                return Err(CborError::NonCanonical);
            }
            v
        }
        25 => {
            let b = read_exact(data, pos, 2)?;
            let v = u16::from_be_bytes([b[0], b[1]]) as u64;
            if v <= u8::MAX as u64 {
                return Err(CborError::NonCanonical);
            }
            v
        }
        26 => {
            let b = read_exact(data, pos, 4)?;
            let v = u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64;
            if v <= u16::MAX as u64 {
                return Err(CborError::NonCanonical);
            }
            v
        }
        27 => {
            let b = read_exact(data, pos, 8)?;
            let v = u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
            if v <= u32::MAX as u64 {
                return Err(CborError::NonCanonical);
            }
            v
        }
        _ => return Err(CborError::Unsupported { major, info }),
    };

    Ok((major, arg))
}

fn read_exact<'a>(data: &'a [u8], pos: &mut usize, len: u64) -> Result<&'a [u8], CborError> {
    let len = usize::try_from(len).map_err(|_| CborError::LengthOverflow)?;
    let end = pos.checked_add(len).ok_or(CborError::LengthOverflow)?;
    if end > data.len() {
        return Err(CborError::UnexpectedEof);
    }
    let slice = &data[*pos..end];
    *pos = end;
    Ok(slice)
}
