//! Integrity checker.
//!
//! Replays the stored height range against the chain and fills in missing
//! transactions, matched by natural key. Nothing is deleted or rewritten.
//!
//! The block document of every replayed height is inserted again without a
//! lookup, so repeated runs leave duplicate block rows behind. Transactions
//! are deduplicated; blocks are not.

use log::{info, warn};

use crate::{
    ChainAdapter, CheckReport, DocumentStore, SyncError, SyncResult, BLOCK_COLL, TRANSACTION_COLL,
};

pub struct IntegrityChecker<'a, C: ?Sized, S: ?Sized> {
    chain: &'a C,
    store: &'a S,
}

impl<'a, C, S> IntegrityChecker<'a, C, S>
where
    C: ChainAdapter + ?Sized,
    S: DocumentStore + ?Sized,
{
    pub fn new(chain: &'a C, store: &'a S) -> Self {
        Self { chain, store }
    }

    /// Check heights `0..=local_latest`. An empty store checks nothing.
    pub async fn check(&self, local_latest: Option<u64>) -> SyncResult<CheckReport> {
        let mut report = CheckReport::default();
        let Some(local_latest) = local_latest else {
            info!("nothing to check, block collection is empty");
            return Ok(report);
        };

        for height in 0..=local_latest {
            let (inserted, total) = self.check_height(height).await?;
            report.heights += 1;
            report.inserted += inserted;
            report.total += total;
        }

        info!(
            "check done: {} heights, {}/{} txs inserted",
            report.heights, report.inserted, report.total
        );
        Ok(report)
    }

    /// Returns `(inserted, total)` transaction counts for one height.
    async fn check_height(&self, height: u64) -> SyncResult<(u64, u64)> {
        let key = self.chain.family().transaction_key();
        let block = self.chain.get_block_for_check(height).await?;
        let total = block.transactions.len() as u64;

        let mut inserted = 0u64;
        for tx in block.transactions {
            let natural_key = tx.get(key).cloned().ok_or_else(|| SyncError::Decode {
                height,
                message: format!("transaction without {}", key),
            })?;
            if self
                .store
                .find_one(TRANSACTION_COLL, key, &natural_key)
                .await?
                .is_none()
            {
                self.store.insert_one(TRANSACTION_COLL, tx).await?;
                inserted += 1;
            }
        }

        self.store.insert_one(BLOCK_COLL, block.block).await?;

        if inserted > 0 {
            warn!("checked block @ {} ({}/{} txs)", height, inserted, total);
        } else {
            info!("checked block @ {} ({}/{} txs)", height, inserted, total);
        }
        Ok((inserted, total))
    }
}
