//! System catalog for keystone
//!
//! One catalog file exists per database directory. It is the single source
//! of truth for table schemas and is rewritten synchronously at the end of
//! every DDL statement.
//!
//! The file layout is a flat binary encoding: a table count, then for each
//! table its name, column count, per-column metadata, and the data/index
//! file paths. Strings are 4-byte length-prefixed UTF-8; integers are
//! little-endian.

use super::schema::{Column, TableSchema};
use super::types::ColumnType;
use crate::error::{Error, Result};
use std::path::Path;

/// Persistent set of table schemas for one database
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    /// Tables in creation order
    pub tables: Vec<TableSchema>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    /// Load a catalog from disk. A missing file yields an empty catalog.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes).map_err(|reason| Error::Corrupted {
            file: path.display().to_string(),
            reason,
        })
    }

    /// Save the catalog to disk, replacing any previous contents.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.encode())?;
        Ok(())
    }

    /// Add a table. Fails if a table of that name already exists.
    pub fn create_table(&mut self, table: TableSchema) -> Result<()> {
        if self.tables.iter().any(|t| t.name == table.name) {
            return Err(Error::TableAlreadyExists(table.name));
        }
        self.tables.push(table);
        Ok(())
    }

    /// Remove a table, returning its schema.
    pub fn drop_table(&mut self, name: &str) -> Result<TableSchema> {
        let pos = self
            .tables
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        Ok(self.tables.remove(pos))
    }

    /// Get a table's schema by name
    pub fn get_table_schema(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Check if a table exists
    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name == name)
    }

    /// List all table names in creation order
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.tables.len() as u32).to_le_bytes());
        for table in &self.tables {
            write_string(&mut bytes, &table.name);
            bytes.extend_from_slice(&(table.columns.len() as u32).to_le_bytes());
            for col in &table.columns {
                write_string(&mut bytes, &col.name);
                bytes.push(col.column_type.tag());
                bytes.extend_from_slice(&(col.length as u32).to_le_bytes());
                bytes.push(col.is_primary_key as u8);
                bytes.push(col.is_foreign_key as u8);
                write_string(&mut bytes, &col.references_table);
                write_string(&mut bytes, &col.references_column);
            }
            write_string(&mut bytes, &table.data_file_path);
            write_string(&mut bytes, &table.index_file_path);
        }
        bytes
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let mut pos = 0;
        let table_count = read_u32(bytes, &mut pos)? as usize;
        let mut tables = Vec::with_capacity(table_count);
        for _ in 0..table_count {
            let mut table = TableSchema::new(read_string(bytes, &mut pos)?);
            let column_count = read_u32(bytes, &mut pos)? as usize;
            for _ in 0..column_count {
                let name = read_string(bytes, &mut pos)?;
                let tag = read_u8(bytes, &mut pos)?;
                let column_type = ColumnType::from_tag(tag)
                    .ok_or_else(|| format!("unknown column type tag {}", tag))?;
                let length = read_u32(bytes, &mut pos)? as usize;
                let is_primary_key = read_u8(bytes, &mut pos)? != 0;
                let is_foreign_key = read_u8(bytes, &mut pos)? != 0;
                let references_table = read_string(bytes, &mut pos)?;
                let references_column = read_string(bytes, &mut pos)?;
                table.columns.push(Column {
                    name,
                    column_type,
                    length,
                    is_primary_key,
                    is_foreign_key,
                    references_table,
                    references_column,
                });
            }
            table.data_file_path = read_string(bytes, &mut pos)?;
            table.index_file_path = read_string(bytes, &mut pos)?;
            tables.push(table);
        }
        Ok(Self { tables })
    }
}

fn write_string(bytes: &mut Vec<u8>, s: &str) {
    bytes.extend_from_slice(&(s.len() as u32).to_le_bytes());
    bytes.extend_from_slice(s.as_bytes());
}

fn read_u8(bytes: &[u8], pos: &mut usize) -> std::result::Result<u8, String> {
    let b = *bytes.get(*pos).ok_or("unexpected end of catalog file")?;
    *pos += 1;
    Ok(b)
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> std::result::Result<u32, String> {
    let end = pos.checked_add(4).ok_or("offset overflow")?;
    let slice = bytes.get(*pos..end).ok_or("unexpected end of catalog file")?;
    *pos = end;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_string(bytes: &[u8], pos: &mut usize) -> std::result::Result<String, String> {
    let len = read_u32(bytes, pos)? as usize;
    let end = pos.checked_add(len).ok_or("offset overflow")?;
    let slice = bytes.get(*pos..end).ok_or("unexpected end of catalog file")?;
    *pos = end;
    String::from_utf8(slice.to_vec()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_catalog() -> Catalog {
        let mut users = TableSchema::new("users");
        users
            .columns
            .push(Column::new("id", ColumnType::Int, 0).primary_key(true));
        users.columns.push(Column::new("name", ColumnType::Str, 20));
        users.data_file_path = "/tmp/db/users.dat".to_string();
        users.index_file_path = "/tmp/db/users.idx".to_string();

        let mut orders = TableSchema::new("orders");
        orders
            .columns
            .push(Column::new("oid", ColumnType::Int, 0).primary_key(true));
        orders
            .columns
            .push(Column::new("uid", ColumnType::Int, 0).references("users", "id"));
        orders.data_file_path = "/tmp/db/orders.dat".to_string();
        orders.index_file_path = "/tmp/db/orders.idx".to_string();

        let mut catalog = Catalog::new();
        catalog.create_table(users).unwrap();
        catalog.create_table(orders).unwrap();
        catalog
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.bin");

        let catalog = sample_catalog();
        catalog.save(&path).unwrap();
        let loaded = Catalog::load(&path).unwrap();

        assert_eq!(loaded, catalog);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::load(dir.path().join("nope.bin")).unwrap();
        assert!(catalog.tables.is_empty());
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let mut catalog = sample_catalog();
        let result = catalog.create_table(TableSchema::new("users"));
        assert!(matches!(result, Err(Error::TableAlreadyExists(_))));
    }

    #[test]
    fn test_drop_table() {
        let mut catalog = sample_catalog();
        catalog.drop_table("orders").unwrap();
        assert!(!catalog.table_exists("orders"));
        assert!(matches!(
            catalog.drop_table("orders"),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_truncated_file_is_corrupted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.bin");
        sample_catalog().save(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            Catalog::load(&path),
            Err(Error::Corrupted { .. })
        ));
    }
}
