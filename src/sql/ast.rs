//! SQL abstract syntax tree (AST) for keystone
//!
//! This module defines the typed query descriptors the parser produces and
//! the executor consumes.

use crate::catalog::ColumnType;
use crate::storage::value::{FieldValue, Record};

/// A parsed SQL statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// CREATE DATABASE name
    CreateDatabase { name: String },
    /// DROP DATABASE name
    DropDatabase { name: String },
    /// USE name
    UseDatabase { name: String },
    /// SHOW DATABASES
    ShowDatabases,
    /// SHOW TABLES
    ShowTables,
    /// CREATE TABLE
    CreateTable(CreateTableStatement),
    /// DROP TABLE name
    DropTable { name: String },
    /// INSERT INTO ... VALUES (...)
    Insert(InsertStatement),
    /// SELECT
    Select(SelectStatement),
    /// UPDATE ... SET ...
    Update(UpdateStatement),
    /// DELETE FROM ...
    Delete(DeleteStatement),
}

/// One column definition in CREATE TABLE
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Declared type
    pub column_type: ColumnType,
    /// Declared length (STRING/CHAR only, 0 otherwise)
    pub length: usize,
}

/// One FOREIGN KEY clause in CREATE TABLE
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDef {
    /// Local column
    pub column: String,
    /// Referenced table
    pub references_table: String,
    /// Referenced column (defaults to the local column name)
    pub references_column: String,
}

/// CREATE TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    /// Table name
    pub table_name: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnDef>,
    /// Primary key column name, if declared
    pub primary_key: Option<String>,
    /// Foreign key clauses
    pub foreign_keys: Vec<ForeignKeyDef>,
}

/// INSERT statement; values are already bound to column names and coerced
/// to the column types
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// Target table name
    pub table_name: String,
    /// The record to insert
    pub record: Record,
}

/// The projection of a SELECT
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `*`: every column
    All,
    /// Explicit column list, qualified or unqualified
    Columns(Vec<String>),
}

/// JOIN clause of a SELECT
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    /// The joined (right) table
    pub table_name: String,
    /// Qualified column of the FROM table
    pub left_column: String,
    /// Qualified column of the joined table
    pub right_column: String,
}

/// SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// FROM table
    pub table_name: String,
    /// Projected columns
    pub projection: Projection,
    /// Optional inner join
    pub join: Option<JoinClause>,
    /// WHERE comparisons
    pub conditions: Vec<Condition>,
    /// WHERE connectives, left-to-right
    pub connectives: Vec<Connective>,
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    /// Target table name
    pub table_name: String,
    /// SET assignments in source order
    pub assignments: Vec<(String, FieldValue)>,
    /// WHERE comparisons
    pub conditions: Vec<Condition>,
    /// WHERE connectives, left-to-right
    pub connectives: Vec<Connective>,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    /// Target table name
    pub table_name: String,
    /// WHERE comparisons
    pub conditions: Vec<Condition>,
    /// WHERE connectives, left-to-right
    pub connectives: Vec<Connective>,
}

/// One WHERE comparison: `column op value`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Column reference, qualified or unqualified
    pub column: String,
    /// Comparison operator
    pub op: CompareOp,
    /// Literal to compare against
    pub value: FieldValue,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    /// Parsed but never matches any record
    Like,
}

/// Logical connectives joining WHERE comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
    Not,
}
