//! Chainshrew Test Suite
//!
//! End-to-end tests driving the real chain adapters over a scripted
//! transport into both the in-memory and the RocksDB document stores.

pub mod tests;

pub use tests::block_builder::{BtcBlockBuilder, EthBlockBuilder, TronBlockBuilder};
pub use tests::TestUtils;
