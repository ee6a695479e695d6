//! RocksDB-backed document store

pub mod adapter;
pub mod cursor;
pub mod keys;

pub use adapter::{RocksDocumentStore, DEFAULT_INDEXES};
pub use cursor::{MemoryCursor, SpillCursor};
