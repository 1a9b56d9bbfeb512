//! Query execution module
//!
//! This module contains the statement executor and the WHERE-clause
//! condition engine.

pub mod engine;
pub mod filter;

pub use engine::{Engine, QueryKind, QueryResult};
