//! Bitcoin-style chain adapter (bitcoind / btcd JSON-RPC).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::chains::{into_document, take_array, with_height};
use crate::{ChainAdapter, ChainBlock, ChainFamily, Document, RpcTransport, SyncError, SyncResult, HEIGHT_FIELD};

/// Adapter for nodes speaking the Bitcoin Core RPC dialect.
///
/// Blocks are fetched by hash with verbose transactions. Nodes that leave
/// the verbose `tx` list empty and return the transactions under `rawtx`
/// instead have that list substituted.
#[derive(Clone)]
pub struct BitcoinAdapter<T: RpcTransport> {
    transport: T,
}

impl<T: RpcTransport> BitcoinAdapter<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn get_block_hash(&self, height: u64) -> SyncResult<String> {
        let hash = self.transport.call("getblockhash", vec![json!(height)]).await?;
        match hash {
            Value::String(hash) => Ok(hash),
            other => Err(SyncError::Decode {
                height,
                message: format!("getblockhash returned {}", other),
            }),
        }
    }
}

/// Split a verbose `getblock` payload into block and transaction documents.
pub fn normalize_block(height: u64, block: Value, include_txs: bool) -> SyncResult<ChainBlock> {
    let mut block = into_document(block, height, "block")?;

    if let Some(reported) = block.get(HEIGHT_FIELD).and_then(Value::as_u64) {
        if reported != height {
            return Err(SyncError::Decode {
                height,
                message: format!("node returned block at height {}", reported),
            });
        }
    }

    let mut txs = take_array(&mut block, "tx", height)?;
    let raw_txs = take_array(&mut block, "rawtx", height)?;
    if txs.is_empty() {
        txs = raw_txs;
    }

    let transactions: Vec<Document> = if include_txs {
        with_height(txs, height, "transaction")?
    } else {
        Vec::new()
    };

    block.insert(HEIGHT_FIELD.to_string(), Value::from(height));
    Ok(ChainBlock {
        height,
        block,
        transactions,
        ..Default::default()
    })
}

#[async_trait]
impl<T: RpcTransport> ChainAdapter for BitcoinAdapter<T> {
    fn family(&self) -> ChainFamily {
        ChainFamily::Bitcoin
    }

    async fn get_remote_tip_height(&self) -> SyncResult<u64> {
        let count = self.transport.call("getblockcount", vec![]).await?;
        count
            .as_u64()
            .ok_or_else(|| SyncError::Rpc(format!("getblockcount returned {}", count)))
    }

    async fn get_block_by_height(&self, height: u64, include_txs: bool) -> SyncResult<ChainBlock> {
        let hash = self.get_block_hash(height).await?;
        let verbosity = if include_txs { 2 } else { 1 };
        let block = self
            .transport
            .call("getblock", vec![json!(hash), json!(verbosity)])
            .await?;
        normalize_block(height, block, include_txs)
    }
}
