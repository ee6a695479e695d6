//! Block/transaction writer.
//!
//! Each height is written as one logical unit: a bulk insert per auxiliary
//! collection followed by the block document. The writes are not wrapped in
//! a cross-collection transaction; a failure between them leaves transaction
//! rows for a height whose block row is missing, and the checkpoint (derived
//! from block rows) stays below that height.

use std::ops::RangeInclusive;

use log::{debug, info};

use crate::{
    ChainAdapter, ChainBlock, DocumentStore, PreloadReport, SyncResult, BLOCK_COLL, RECEIPT_COLL,
    TRANSACTION_COLL, TRANSACTION_INFO_COLL,
};

pub struct BlockWriter<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> BlockWriter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Persist one normalized block. Returns the number of transactions written.
    pub async fn write(&self, block: ChainBlock) -> SyncResult<usize> {
        let ChainBlock {
            height,
            block,
            transactions,
            receipts,
            transaction_infos,
        } = block;
        let tx_count = transactions.len();

        if tx_count > 0 {
            self.store.insert_many(TRANSACTION_COLL, transactions).await?;
            if !receipts.is_empty() {
                self.store.insert_many(RECEIPT_COLL, receipts).await?;
            }
            if !transaction_infos.is_empty() {
                self.store
                    .insert_many(TRANSACTION_INFO_COLL, transaction_infos)
                    .await?;
            }
        }

        self.store.insert_one(BLOCK_COLL, block).await?;
        debug!("wrote block {} with {} txs", height, tx_count);
        Ok(tx_count)
    }

    /// Fetch and write every height in `range`, ascending, stopping at the first error.
    pub async fn preload<C>(&self, chain: &C, range: RangeInclusive<u64>) -> SyncResult<PreloadReport>
    where
        C: ChainAdapter + ?Sized,
    {
        let mut report = PreloadReport {
            from: Some(*range.start()),
            to: Some(*range.end()),
            ..Default::default()
        };

        for height in range {
            let block = chain.get_block_by_height(height, true).await?;
            let tx_count = self.write(block).await?;
            report.blocks += 1;
            report.transactions += tx_count as u64;
            info!("inserted block @ {} ({} txs)", height, tx_count);
        }

        Ok(report)
    }
}
