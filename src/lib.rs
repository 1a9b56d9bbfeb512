//! keystone - a small relational database engine written in Rust
//!
//! This library provides the core components for a single-process,
//! single-node SQL store:
//! - SQL parsing (lexer, parser, AST) for a small DDL/DML subset
//! - Storage engine (fixed-width record files, paged B+ tree index)
//! - System catalog persisted per database
//! - Query execution with a primary-key index fast path
//!
//! The public surface is [`Engine::execute`], which takes query text and
//! returns a [`QueryResult`] envelope; errors never escape it. Embedders
//! providing a console or network front-end consume that contract plus the
//! engine's `list_*` introspection.

pub mod catalog;
pub mod error;
pub mod executor;
pub mod sql;
pub mod storage;

pub use error::{Error, Result};
pub use executor::{Engine, QueryKind, QueryResult};
pub use storage::{FieldValue, Record};
