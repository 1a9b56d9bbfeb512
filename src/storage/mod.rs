//! Storage engine module
//!
//! This module contains the storage engine components:
//! - Field values and records
//! - Fixed-width field codec
//! - Record (heap) files
//! - B+ tree primary-key index

pub mod btree;
pub mod field;
pub mod heap;
pub mod value;

pub use btree::BPlusTree;
pub use value::{FieldValue, Record};
