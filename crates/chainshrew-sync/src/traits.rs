//! # Core Trait Definitions
//!
//! The engine is assembled from three seams:
//!
//! ### [`ChainAdapter`]
//! One implementation per chain family. Owns the family-specific
//! normalization (receipt parity, raw transaction fallback, transaction
//! infos) so the shared writer never branches on the family.
//!
//! ### [`DocumentStore`]
//! The persistent document store, used only through find/insert/bulk
//! insert/upsert and a grouped distinct aggregation that streams its
//! results through a [`DistinctCursor`].
//!
//! ### [`RpcTransport`]
//! The wire underneath the chain adapters: JSON-RPC calls, JSON-RPC batches
//! and REST-style POSTs.
//!
//! [`SyncManager`] composes them into the four public operations.

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    AccountFields, AggregateOptions, BatchCall, ChainBlock, ChainFamily, CheckReport, Document,
    JsonRpcError, PreloadReport, StateReport, SyncError, SyncResult,
};

/// Trait for chain adapters that provide blockchain data.
///
/// Methods return [`SyncError::Rpc`] for node failures and
/// [`SyncError::Decode`] for payloads that cannot be normalized.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// The chain family this adapter speaks to.
    fn family(&self) -> ChainFamily;

    /// Height of the most recent block known to the node.
    async fn get_remote_tip_height(&self) -> SyncResult<u64>;

    /// Fetch and normalize the block at `height`.
    ///
    /// With `include_txs` the returned [`ChainBlock`] carries the block's
    /// transactions plus any family extras (receipts, transaction infos);
    /// otherwise only the stripped block document is returned.
    async fn get_block_by_height(&self, height: u64, include_txs: bool) -> SyncResult<ChainBlock>;

    /// Block and transactions at `height` for the integrity check.
    ///
    /// The check stores only blocks and transactions, so adapters whose full
    /// fetch pulls further per-block payloads override this to skip them.
    async fn get_block_for_check(&self, height: u64) -> SyncResult<ChainBlock> {
        self.get_block_by_height(height, true).await
    }

    /// Receipts for every transaction at `height`, in transaction order.
    async fn get_receipts(&self, _height: u64) -> SyncResult<Vec<Document>> {
        Err(SyncError::Unsupported(format!(
            "receipts are not available for {}",
            self.family()
        )))
    }

    /// Balance, code and storage slot `0x0` of `address` at the latest block.
    async fn batch_get_account_fields(&self, _address: &str) -> SyncResult<AccountFields> {
        Err(SyncError::Unsupported(format!(
            "account state is not available for {}",
            self.family()
        )))
    }
}

/// Sort direction for [`DocumentStore::find_sorted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Result of [`DocumentStore::upsert_one`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Trait for document stores that persist ingested data.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Cheap document count; may be approximate.
    async fn estimated_count(&self, collection: &str) -> SyncResult<u64>;

    /// Documents sorted by `field`, at most `limit` of them. Documents
    /// lacking the field sort below every present value.
    async fn find_sorted(
        &self,
        collection: &str,
        field: &str,
        order: SortOrder,
        limit: usize,
    ) -> SyncResult<Vec<Document>>;

    /// First document whose `field` equals `value`.
    async fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> SyncResult<Option<Document>>;

    /// Insert a single document.
    async fn insert_one(&self, collection: &str, document: Document) -> SyncResult<()>;

    /// Bulk insert submitted as one store operation.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> SyncResult<()>;

    /// Set `fields` on the document whose `key_field` equals `key`,
    /// creating it when absent.
    async fn upsert_one(
        &self,
        collection: &str,
        key_field: &str,
        key: &Value,
        fields: Document,
    ) -> SyncResult<UpsertOutcome>;

    /// Create a secondary index on `field`. Creating an existing index is not an error.
    async fn create_index(&self, collection: &str, field: &str) -> SyncResult<()>;

    /// Group `collection` by `field` and stream the distinct values.
    async fn group_distinct(
        &self,
        collection: &str,
        field: &str,
        options: AggregateOptions,
    ) -> SyncResult<Box<dyn DistinctCursor>>;
}

/// Streaming cursor over the distinct values of a grouped aggregation.
///
/// Batches are handed out one at a time; `None` marks exhaustion.
#[async_trait]
pub trait DistinctCursor: Send {
    async fn next_batch(&mut self) -> SyncResult<Option<Vec<Value>>>;
}

/// Wire transport used by the chain adapters.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Single JSON-RPC call returning the `result` member.
    async fn call(&self, method: &str, params: Vec<Value>) -> SyncResult<Value>;

    /// JSON-RPC batch. Results come back in call order with per-call errors in place.
    async fn batch(&self, calls: Vec<BatchCall>) -> SyncResult<Vec<Result<Value, JsonRpcError>>>;

    /// POST a JSON body to `path` relative to the transport's base URL.
    async fn post(&self, path: &str, body: Value) -> SyncResult<Value>;
}

/// The per-chain synchronization facade.
#[async_trait]
pub trait SyncManager: Send + Sync {
    /// Ingest every height above the local checkpoint up to the safe remote
    /// height, capped by `end` when given.
    async fn preload(&self, end: Option<u64>) -> SyncResult<PreloadReport>;

    /// Live tailing. Not implemented.
    async fn sync(&self) -> SyncResult<()>;

    /// Rebuild the account state collection from stored addresses.
    async fn maintain_state(&self) -> SyncResult<StateReport>;

    /// Re-verify the local range against the chain, filling missing transactions.
    async fn check(&self) -> SyncResult<CheckReport>;
}
