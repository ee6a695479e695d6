//! Test suite for the chain sync engine
//!
//! Node payloads are built with the builders in [`block_builder`] and served
//! through `MockTransport`, so every test runs the production adapters and
//! normalization code.

use chainshrew_rocksdb::RocksDocumentStore;
use chainshrew_sync::{ChainFamily, Document, SyncConfig};
use serde_json::Value;
use tempfile::TempDir;

pub mod checkpoint_test;
pub mod ethereum_sync_test;

/// Test utilities shared by the suites
pub struct TestUtils;

impl TestUtils {
    /// Route engine logs to the test harness; set `RUST_LOG` to see them
    pub fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Open a RocksDB document store in a fresh temporary directory
    pub fn open_store() -> (TempDir, RocksDocumentStore) {
        Self::init_logging();
        let dir = TempDir::new().unwrap();
        let store = Self::reopen_store(&dir);
        (dir, store)
    }

    pub fn reopen_store(dir: &TempDir) -> RocksDocumentStore {
        RocksDocumentStore::open_optimized(dir.path().to_string_lossy().to_string()).unwrap()
    }

    pub fn config(family: ChainFamily, bucket_size: u64) -> SyncConfig {
        Self::init_logging();
        SyncConfig {
            bucket_size,
            ..SyncConfig::for_family(family)
        }
    }

    pub fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }
}
