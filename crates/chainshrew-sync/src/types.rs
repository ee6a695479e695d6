//! Common types for chainshrew-sync

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{SyncError, SyncResult};

/// A stored document. Every collection holds plain JSON objects.
pub type Document = serde_json::Map<String, Value>;

pub const BLOCK_COLL: &str = "blockColl";
pub const TRANSACTION_COLL: &str = "transactionColl";
pub const RECEIPT_COLL: &str = "receiptColl";
pub const TRANSACTION_INFO_COLL: &str = "transactionInfoColl";
pub const STATE_COLL: &str = "stateColl";

/// Field every block, transaction, receipt and transaction info carries.
pub const HEIGHT_FIELD: &str = "height";

/// Key field of the state collection.
pub const ADDRESS_FIELD: &str = "address";

/// A collection/field pair scanned for distinct addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSource {
    pub collection: &'static str,
    pub field: &'static str,
}

/// Passes run by the state maintainer, in order: block producers, senders, recipients.
pub const ADDRESS_SOURCES: [AddressSource; 3] = [
    AddressSource {
        collection: BLOCK_COLL,
        field: "miner",
    },
    AddressSource {
        collection: TRANSACTION_COLL,
        field: "from",
    },
    AddressSource {
        collection: TRANSACTION_COLL,
        field: "to",
    },
];

/// Chain families the engine knows how to ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainFamily {
    Bitcoin,
    Ethereum,
    Tron,
}

impl ChainFamily {
    /// Pick a family from a free-form chain name such as `eth`, `btc-testnet` or `tron`.
    pub fn from_chain_name(name: &str) -> SyncResult<Self> {
        let name = name.to_ascii_lowercase();
        if name.contains("eth") {
            Ok(ChainFamily::Ethereum)
        } else if name.contains("btc") {
            Ok(ChainFamily::Bitcoin)
        } else if name.contains("tron") {
            Ok(ChainFamily::Tron)
        } else {
            Err(SyncError::Config(format!("unknown chain name: {}", name)))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChainFamily::Bitcoin => "btc",
            ChainFamily::Ethereum => "eth",
            ChainFamily::Tron => "tron",
        }
    }

    /// Confirmation bucket used by the safe-height policy.
    pub fn default_bucket_size(&self) -> u64 {
        match self {
            ChainFamily::Bitcoin => 100,
            ChainFamily::Ethereum => 100,
            ChainFamily::Tron => 1_000,
        }
    }

    /// Natural key of a transaction document.
    pub fn transaction_key(&self) -> &'static str {
        match self {
            ChainFamily::Bitcoin | ChainFamily::Ethereum => "hash",
            ChainFamily::Tron => "txID",
        }
    }

    /// Base-unit exponent of the native coin (wei, sun). `None` for UTXO chains.
    pub fn balance_decimals(&self) -> Option<u8> {
        match self {
            ChainFamily::Bitcoin => None,
            ChainFamily::Ethereum => Some(18),
            ChainFamily::Tron => Some(6),
        }
    }
}

impl std::fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for a sync manager
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Safe-height bucket size
    pub bucket_size: u64,
    /// Cursor batch size for distinct-address aggregation
    pub aggregate_batch_size: u32,
    /// Allow the store to spill aggregation state to disk
    pub allow_disk_use: bool,
}

impl SyncConfig {
    pub fn for_family(family: ChainFamily) -> Self {
        Self {
            bucket_size: family.default_bucket_size(),
            ..Default::default()
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bucket_size: 100,
            aggregate_batch_size: 1,
            allow_disk_use: true,
        }
    }
}

/// Options for a grouped aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    pub allow_disk_use: bool,
    pub batch_size: u32,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            allow_disk_use: true,
            batch_size: 1,
        }
    }
}

/// A block fetched from the chain and split into its stored parts.
///
/// `block` no longer carries its embedded transaction list. Every document
/// already has the numeric `height` attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainBlock {
    pub height: u64,
    pub block: Document,
    pub transactions: Vec<Document>,
    pub receipts: Vec<Document>,
    pub transaction_infos: Vec<Document>,
}

/// Raw account fields as returned by the node, all hex strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountFields {
    pub balance: String,
    pub code: String,
    pub storage: String,
}

/// Outcome of a `preload` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub blocks: u64,
    pub transactions: u64,
}

/// Outcome of a `check` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub heights: u64,
    pub inserted: u64,
    pub total: u64,
}

/// Outcome of a `maintain_state` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateReport {
    pub addresses: u64,
}

/// JSON-RPC request structure
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JsonRpcRequest {
    pub id: u64,
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Vec<Value>) -> Self {
        Self {
            id,
            jsonrpc: String::from("2.0"),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC response structure
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JsonRpcResponse {
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error structure
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// One call inside a JSON-RPC batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl BatchCall {
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        Self {
            method: method.to_string(),
            params,
        }
    }
}
