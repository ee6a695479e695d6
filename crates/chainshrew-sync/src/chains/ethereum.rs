//! Ethereum-style chain adapter (execution-layer JSON-RPC).

use async_trait::async_trait;
use log::error;
use serde_json::{json, Value};

use crate::chains::{
    fetch_account_fields, into_document, parse_hex_quantity, take_array, to_hex_quantity,
    with_height,
};
use crate::{
    AccountFields, ChainAdapter, ChainBlock, ChainFamily, Document, RpcTransport, SyncError,
    SyncResult, HEIGHT_FIELD,
};

#[derive(Clone)]
pub struct EthereumAdapter<T: RpcTransport> {
    transport: T,
}

impl<T: RpcTransport> EthereumAdapter<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

/// Attach `height` and decoded `time`, and split out the full transaction objects.
///
/// Without `include_txs` the node returns bare hashes, which are dropped.
pub fn normalize_block(
    height: u64,
    block: Value,
    include_txs: bool,
) -> SyncResult<(Document, Vec<Document>)> {
    if block.is_null() {
        return Err(SyncError::Decode {
            height,
            message: "block not found".to_string(),
        });
    }
    let mut block = into_document(block, height, "block")?;

    let number = block
        .get("number")
        .map(|n| parse_hex_quantity(n, height, "number"))
        .transpose()?
        .ok_or_else(|| SyncError::Decode {
            height,
            message: "block without number".to_string(),
        })?;
    if number != height {
        return Err(SyncError::Decode {
            height,
            message: format!("node returned block {}", number),
        });
    }
    if let Some(timestamp) = block.get("timestamp") {
        let time = parse_hex_quantity(timestamp, height, "timestamp")?;
        block.insert("time".to_string(), Value::from(time));
    }
    block.insert(HEIGHT_FIELD.to_string(), Value::from(height));

    let transactions = take_array(&mut block, "transactions", height)?;
    if !include_txs {
        return Ok((block, Vec::new()));
    }
    Ok((block, with_height(transactions, height, "transaction")?))
}

/// Every transaction must have exactly one receipt.
pub fn ensure_receipt_parity(height: u64, transactions: usize, receipts: usize) -> SyncResult<()> {
    if transactions != receipts {
        error!(
            "invalid receipts len at {}: {} txs, {} receipts",
            height, transactions, receipts
        );
        return Err(SyncError::ReceiptMismatch {
            height,
            transactions,
            receipts,
        });
    }
    Ok(())
}

#[async_trait]
impl<T: RpcTransport> ChainAdapter for EthereumAdapter<T> {
    fn family(&self) -> ChainFamily {
        ChainFamily::Ethereum
    }

    async fn get_remote_tip_height(&self) -> SyncResult<u64> {
        let number = self.transport.call("eth_blockNumber", vec![]).await?;
        parse_hex_quantity(&number, 0, "eth_blockNumber")
            .map_err(|e| SyncError::Rpc(format!("eth_blockNumber: {}", e)))
    }

    async fn get_block_by_height(&self, height: u64, include_txs: bool) -> SyncResult<ChainBlock> {
        let block = self
            .transport
            .call(
                "eth_getBlockByNumber",
                vec![json!(to_hex_quantity(height)), json!(include_txs)],
            )
            .await?;
        let (block, transactions) = normalize_block(height, block, include_txs)?;
        if !include_txs {
            return Ok(ChainBlock {
                height,
                block,
                ..Default::default()
            });
        }

        let receipts = self.get_receipts(height).await?;
        ensure_receipt_parity(height, transactions.len(), receipts.len())?;

        Ok(ChainBlock {
            height,
            block,
            transactions,
            receipts,
            transaction_infos: Vec::new(),
        })
    }

    async fn get_receipts(&self, height: u64) -> SyncResult<Vec<Document>> {
        let receipts = self
            .transport
            .call("eth_getBlockReceipts", vec![json!(to_hex_quantity(height))])
            .await?;
        let receipts = match receipts {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            other => {
                return Err(SyncError::Decode {
                    height,
                    message: format!("receipts are not an array: {}", other),
                })
            }
        };
        with_height(receipts, height, "receipt")
    }

    async fn batch_get_account_fields(&self, address: &str) -> SyncResult<AccountFields> {
        fetch_account_fields(&self.transport, address).await
    }
}
