use std::io::Write;

use super::error::CborError;
use super::value::Value;

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;

/// Encodes a CBOR value to bytes.
///
/// The encoding is canonical: all lengths are definite and every head uses
/// the shortest form that fits, so equal values encode to equal bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>, CborError> {
    let mut buf = Vec::new();
    encode_value(value, &mut buf)?;
    Ok(buf)
}

fn encode_value<W: Write>(value: &Value, writer: &mut W) -> Result<(), CborError> {
    match value {
        Value::Unsigned(n) => {
            write_head(writer, MAJOR_UNSIGNED, *n)?;
        }
        Value::Bytes(b) => {
            write_head(writer, MAJOR_BYTES, b.len() as u64)?;
            writer.write_all(b)?;
        }
        Value::Text(s) => {
            write_head(writer, MAJOR_TEXT, s.len() as u64)?;
            writer.write_all(s.as_bytes())?;
        }
        Value::Array(items) => {
            write_head(writer, MAJOR_ARRAY, items.len() as u64)?;
            for item in items {
                encode_value(item, writer)?;
            }
        }
        Value::Map(entries) => {
            write_head(writer, MAJOR_MAP, entries.len() as u64)?;
            for (key, val) in entries {
                write_head(writer, MAJOR_TEXT, key.len() as u64)?;
                writer.write_all(key.as_bytes())?;
                encode_value(val, writer)?;
            }
        }
    }
    Ok(())
}

fn write_head<W: Write>(writer: &mut W, major: u8, arg: u64) -> Result<(), CborError> {
    let m = major << 5;
    if arg < 24 {
        writer.write_all(&[m | arg as u8])?;
    } else if arg <= u8::MAX as u64 {
        writer.write_all(&[m | 24, arg as u8])?;
    } else if arg <= u16::MAX as u64 {
        writer.write_all(&[m | 25])?;
        writer.write_all(&(arg as u16).to_be_bytes())?;
    } else if arg <= u32::MAX as u64 {
        writer.write_all(&[m | 26])?;
        writer.write_all(&(arg as u32).to_be_bytes())?;
    } else {
        writer.write_all(&[m | 27])?;
        writer.write_all(&arg.to_be_bytes())?;
    }
    Ok(())
}
