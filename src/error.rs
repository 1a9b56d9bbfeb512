//! Error types for keystone
//!
//! This module defines all error types used throughout the database engine.

use thiserror::Error;

/// The main error type for keystone
#[derive(Error, Debug)]
pub enum Error {
    // ========== Lexer Errors ==========
    #[error("Syntax error: unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),

    #[error("Syntax error: unterminated string literal starting at position {0}")]
    UnterminatedString(usize),

    #[error("Syntax error: invalid number format at position {0}")]
    InvalidNumber(usize),

    // ========== Parser Errors ==========
    #[error("Syntax error: unexpected token '{found}', expected {expected}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Syntax error: unexpected end of input, expected {0}")]
    UnexpectedEof(String),

    #[error("Syntax error: mismatched operators ({operators}) for conditions ({conditions})")]
    MismatchedOperators {
        operators: usize,
        conditions: usize,
    },

    #[error("Syntax error: {0}")]
    Syntax(String),

    // ========== Schema Errors ==========
    #[error("Schema error: no database selected")]
    NoDatabaseSelected,

    #[error("Schema error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Schema error: table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Schema error: column '{0}' does not exist in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Schema error: duplicate column '{0}' in table '{1}'")]
    DuplicateColumn(String, String),

    #[error("Schema error: primary key column '{0}' not found in column definitions")]
    PrimaryKeyNotFound(String),

    #[error("Schema error: primary key column '{0}' must be INT")]
    PrimaryKeyNotInt(String),

    #[error("Schema error: record is missing primary key '{0}'")]
    MissingPrimaryKey(String),

    #[error("Schema error: invalid value '{value}' for column '{column}'")]
    TypeMismatch { value: String, column: String },

    // ========== Database Errors ==========
    #[error("Database error: database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("Database error: database '{0}' already exists")]
    DatabaseAlreadyExists(String),

    // ========== Integrity Errors ==========
    #[error("Integrity error: referenced table '{0}' does not exist")]
    ReferencedTableNotFound(String),

    #[error("Integrity error: column '{0}' is not the primary key of table '{1}'")]
    ReferencedColumnNotKey(String, String),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: corrupted file '{file}': {reason}")]
    Corrupted { file: String, reason: String },
}

/// Result type alias for keystone operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "Schema error: table 'users' not found");

        let err = Error::MismatchedOperators {
            operators: 3,
            conditions: 2,
        };
        assert_eq!(
            err.to_string(),
            "Syntax error: mismatched operators (3) for conditions (2)"
        );
    }
}
