//! Schema definitions for keystone
//!
//! This module defines table schemas and column metadata.

use super::types::ColumnType;
use serde::Serialize;

/// Column definition in a table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Data type
    pub column_type: ColumnType,
    /// Declared length; used only by STRING and CHAR, 0 otherwise
    pub length: usize,
    /// Is this the primary key column?
    pub is_primary_key: bool,
    /// Is this a foreign key column?
    pub is_foreign_key: bool,
    /// Referenced table, when a foreign key
    pub references_table: String,
    /// Referenced column, when a foreign key
    pub references_column: String,
}

impl Column {
    /// Create a new plain column
    pub fn new(name: impl Into<String>, column_type: ColumnType, length: usize) -> Self {
        Self {
            name: name.into(),
            column_type,
            length,
            is_primary_key: false,
            is_foreign_key: false,
            references_table: String::new(),
            references_column: String::new(),
        }
    }

    /// Set the primary key flag
    pub fn primary_key(mut self, pk: bool) -> Self {
        self.is_primary_key = pk;
        self
    }

    /// Mark as a foreign key referencing `table.column`
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.is_foreign_key = true;
        self.references_table = table.into();
        self.references_column = column.into();
        self
    }

    /// Bytes this column's field occupies on disk
    pub fn field_size(&self) -> usize {
        self.column_type.field_size(self.length)
    }
}

/// Table schema: ordered columns plus the paths of the table's files.
///
/// Column order is load-bearing; the record layout on disk follows
/// declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Columns in declaration order
    pub columns: Vec<Column>,
    /// Path of the record file
    pub data_file_path: String,
    /// Path of the primary-key index file
    pub index_file_path: String,
}

impl TableSchema {
    /// Create a schema with no columns yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            data_file_path: String::new(),
            index_file_path: String::new(),
        }
    }

    /// Get a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check whether a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// The primary key column, if the table declares one
    pub fn primary_key_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_primary_key)
    }

    /// Total bytes one record of this schema occupies on disk
    pub fn record_size(&self) -> usize {
        self.columns.iter().map(|c| c.field_size()).sum()
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
