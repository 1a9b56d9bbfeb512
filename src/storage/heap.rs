//! Record file storage for keystone
//!
//! Each table owns one append-only data file holding fixed-width records
//! back-to-back, in insertion order. INSERT appends; UPDATE and DELETE
//! rewrite the whole file through a `.tmp` sibling and rename it into
//! place. File handles are opened per operation and dropped before
//! returning.

use super::field::{decode_record, encode_record};
use super::value::Record;
use crate::catalog::TableSchema;
use crate::error::{Error, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Outcome of the rewrite callback for one record
pub enum Rewrite {
    /// Record did not match; write it back unchanged
    Unchanged(Record),
    /// Record matched and was modified; write the new version
    Updated(Record),
    /// Record matched; drop it from the file
    Remove,
}

fn corrupted(path: &Path, reason: String) -> Error {
    Error::Corrupted {
        file: path.display().to_string(),
        reason,
    }
}

/// Append a record to the table's data file, returning the byte offset at
/// which it was written.
pub fn append_record(schema: &TableSchema, record: &Record) -> Result<u64> {
    let path = Path::new(&schema.data_file_path);
    let bytes =
        encode_record(record, schema).map_err(|reason| corrupted(path, reason))?;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let offset = file.metadata()?.len();
    file.write_all(&bytes)?;
    Ok(offset)
}

/// Read every record in insertion order together with its byte offset.
///
/// A missing data file reads as an empty table.
pub fn scan_with_offsets(schema: &TableSchema) -> Result<Vec<(u64, Record)>> {
    let path = Path::new(&schema.data_file_path);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = std::fs::read(path)?;

    let mut records = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let offset = pos as u64;
        let record =
            decode_record(&bytes, &mut pos, schema).map_err(|reason| corrupted(path, reason))?;
        records.push((offset, record));
    }
    Ok(records)
}

/// Read every record in insertion order.
pub fn scan(schema: &TableSchema) -> Result<Vec<Record>> {
    Ok(scan_with_offsets(schema)?
        .into_iter()
        .map(|(_, record)| record)
        .collect())
}

/// Read the single record starting at `offset`.
pub fn read_at(schema: &TableSchema, offset: u64) -> Result<Record> {
    let path = Path::new(&schema.data_file_path);
    let bytes = std::fs::read(path)?;

    let mut pos = offset as usize;
    if pos >= bytes.len() {
        return Err(corrupted(
            path,
            format!("record offset {} beyond end of file", offset),
        ));
    }
    decode_record(&bytes, &mut pos, schema).map_err(|reason| corrupted(path, reason))
}

/// Rewrite the data file, passing each record through `action`.
///
/// The new contents stream into `<data>.tmp`; if at least one record was
/// updated or removed the temp file is renamed over the original,
/// otherwise the original is left untouched and the temp file deleted.
/// Returns the number of matched (updated or removed) records.
pub fn rewrite(
    schema: &TableSchema,
    mut action: impl FnMut(Record) -> Rewrite,
) -> Result<usize> {
    let path = Path::new(&schema.data_file_path);
    let tmp_path = path.with_extension("dat.tmp");

    let mut out = Vec::new();
    let mut matched = 0usize;
    for (_, record) in scan_with_offsets(schema)? {
        match action(record) {
            Rewrite::Unchanged(record) => {
                out.extend_from_slice(
                    &encode_record(&record, schema).map_err(|reason| corrupted(path, reason))?,
                );
            }
            Rewrite::Updated(record) => {
                matched += 1;
                out.extend_from_slice(
                    &encode_record(&record, schema).map_err(|reason| corrupted(path, reason))?,
                );
            }
            Rewrite::Remove => matched += 1,
        }
    }

    if matched == 0 {
        return Ok(0);
    }

    std::fs::write(&tmp_path, &out)?;
    std::fs::rename(&tmp_path, path)?;
    debug!(
        table = %schema.name,
        matched,
        bytes = out.len(),
        "rewrote data file"
    );
    Ok(matched)
}
