//! Fixed-width field codec for keystone
//!
//! Records are stored as the concatenation of their column encodings in
//! declaration order, so a record's size is fully determined by its schema
//! and files need no per-record framing.
//!
//! Per-type footprints:
//!
//! | Type      | Bytes on disk                          |
//! |-----------|----------------------------------------|
//! | INT       | 4, little-endian                       |
//! | FLOAT     | 4, IEEE-754                            |
//! | BOOL      | 1                                      |
//! | CHAR(n)   | n, NUL-padded                          |
//! | STRING(n) | 4-byte length prefix + n payload bytes |
//!
//! The STRING prefix records `min(actual length, n)`; the payload is always
//! exactly `n` bytes so scans can step by fixed strides.

use super::value::{FieldValue, Record};
use crate::catalog::{Column, ColumnType, TableSchema};

/// Zero/empty default written for a column absent from an inserted record
pub fn default_value(column_type: ColumnType) -> FieldValue {
    match column_type {
        ColumnType::Int => FieldValue::Int(0),
        ColumnType::Float => FieldValue::Float(0.0),
        ColumnType::Str => FieldValue::Str(String::new()),
        ColumnType::Char => FieldValue::Char(String::new()),
        ColumnType::Bool => FieldValue::Bool(false),
    }
}

/// Pad or truncate a CHAR payload to exactly `length` bytes of NUL-padded
/// UTF-8, the form the codec writes and reads back.
pub fn pad_char(s: &str, length: usize) -> String {
    let mut out = truncate_to_boundary(s, length).to_string();
    while out.len() < length {
        out.push('\0');
    }
    out
}

/// Truncate to at most `max` bytes without splitting a UTF-8 sequence
fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Encode one field into `out`.
///
/// The value's tag must match the column type; insert-time coercion
/// guarantees that for records built by the parser.
pub fn encode_field(
    value: &FieldValue,
    column: &Column,
    out: &mut Vec<u8>,
) -> Result<(), String> {
    match (column.column_type, value) {
        (ColumnType::Int, FieldValue::Int(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::Float, FieldValue::Float(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::Bool, FieldValue::Bool(v)) => out.push(*v as u8),
        (ColumnType::Str, FieldValue::Str(v)) => {
            let payload = truncate_to_boundary(v, column.length);
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(payload.as_bytes());
            out.resize(out.len() + column.length - payload.len(), 0);
        }
        (ColumnType::Char, FieldValue::Char(v)) | (ColumnType::Char, FieldValue::Str(v)) => {
            let payload = truncate_to_boundary(v, column.length);
            out.extend_from_slice(payload.as_bytes());
            out.resize(out.len() + column.length - payload.len(), 0);
        }
        _ => {
            return Err(format!(
                "value of type {} cannot be stored in {} column '{}'",
                value.type_name(),
                column.column_type,
                column.name
            ))
        }
    }
    Ok(())
}

/// Encode a whole record in schema column order.
///
/// Columns missing from the record are written as typed defaults.
pub fn encode_record(record: &Record, schema: &TableSchema) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(schema.record_size());
    for column in &schema.columns {
        match record.get(&column.name) {
            Some(value) => encode_field(value, column, &mut out)?,
            None => encode_field(&default_value(column.column_type), column, &mut out)?,
        }
    }
    Ok(out)
}

/// Take the next `n` bytes, advancing `pos`.
fn take<'a>(
    bytes: &'a [u8],
    pos: &mut usize,
    n: usize,
    column: &Column,
) -> Result<&'a [u8], String> {
    let end = pos
        .checked_add(n)
        .filter(|&e| e <= bytes.len())
        .ok_or_else(|| format!("short read in column '{}'", column.name))?;
    let slice = &bytes[*pos..end];
    *pos = end;
    Ok(slice)
}

/// Decode one field, advancing `pos`.
fn decode_field(
    bytes: &[u8],
    pos: &mut usize,
    column: &Column,
) -> Result<FieldValue, String> {
    match column.column_type {
        ColumnType::Int => {
            let raw = take(bytes, pos, 4, column)?;
            Ok(FieldValue::Int(i32::from_le_bytes(raw.try_into().unwrap())))
        }
        ColumnType::Float => {
            let raw = take(bytes, pos, 4, column)?;
            Ok(FieldValue::Float(f32::from_le_bytes(
                raw.try_into().unwrap(),
            )))
        }
        ColumnType::Bool => {
            let raw = take(bytes, pos, 1, column)?;
            Ok(FieldValue::Bool(raw[0] != 0))
        }
        ColumnType::Str => {
            let raw = take(bytes, pos, 4, column)?;
            let len = u32::from_le_bytes(raw.try_into().unwrap()) as usize;
            if len > column.length {
                return Err(format!(
                    "length prefix {} exceeds declared length {} in column '{}'",
                    len, column.length, column.name
                ));
            }
            let payload = take(bytes, pos, column.length, column)?;
            let s = std::str::from_utf8(&payload[..len])
                .map_err(|e| format!("invalid UTF-8 in column '{}': {}", column.name, e))?;
            Ok(FieldValue::Str(s.to_string()))
        }
        ColumnType::Char => {
            let payload = take(bytes, pos, column.length, column)?;
            let s = std::str::from_utf8(payload)
                .map_err(|e| format!("invalid UTF-8 in column '{}': {}", column.name, e))?;
            Ok(FieldValue::Char(s.to_string()))
        }
    }
}

/// Decode a whole record from `bytes` starting at `pos`, advancing `pos`
/// past it.
pub fn decode_record(
    bytes: &[u8],
    pos: &mut usize,
    schema: &TableSchema,
) -> Result<Record, String> {
    let mut record = Record::new();
    for column in &schema.columns {
        let value = decode_field(bytes, pos, column)?;
        record.insert(column.name.clone(), value);
    }
    Ok(record)
}
