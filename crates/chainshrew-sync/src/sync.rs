//! # Chain Synchronization Engine
//!
//! [`ChainSync`] binds one [`ChainAdapter`] to one [`DocumentStore`] and
//! exposes the four operations of [`SyncManager`]. Every operation runs on a
//! single logical thread of control: heights are processed strictly in
//! order and nothing is fetched concurrently, so the checkpoint only ever
//! moves forward.
//!
//! ## Preload
//! 1. Resolve the checkpoint from the block collection.
//! 2. Ask the node for its tip and round it down to the safe height.
//! 3. Fetch, normalize and write every height above the checkpoint.
//!
//! Any error aborts the run. Re-running resumes from the last height whose
//! block row was committed.
//!
//! ## Check
//! Replays `0..=checkpoint` and fills in missing transactions.
//!
//! ## MaintainState
//! Rebuilds the account state collection from the addresses referenced by
//! stored blocks and transactions.
//!
//! ```rust,ignore
//! let chain = EthereumAdapter::new(transport);
//! let store = RocksDocumentStore::open_optimized(path)?;
//! let sync = ChainSync::new(chain, store, SyncConfig::for_family(ChainFamily::Ethereum))?;
//! sync.preload(None).await?;
//! ```

use async_trait::async_trait;
use log::{info, warn};

use crate::checkpoint::resolve_local_latest;
use crate::integrity::IntegrityChecker;
use crate::policy::SafeHeightPolicy;
use crate::state::StateMaintainer;
use crate::writer::BlockWriter;
use crate::{
    AggregateOptions, ChainAdapter, CheckReport, DocumentStore, PreloadReport, StateReport,
    SyncConfig, SyncError, SyncManager, SyncResult, BLOCK_COLL, HEIGHT_FIELD,
};

/// Sync manager generic over the chain adapter and the document store.
pub struct ChainSync<C, S>
where
    C: ChainAdapter,
    S: DocumentStore,
{
    chain: C,
    store: S,
    policy: SafeHeightPolicy,
    pub config: SyncConfig,
}

impl<C, S> ChainSync<C, S>
where
    C: ChainAdapter,
    S: DocumentStore,
{
    pub fn new(chain: C, store: S, config: SyncConfig) -> SyncResult<Self> {
        let policy = SafeHeightPolicy::new(config.bucket_size)?;
        Ok(Self {
            chain,
            store,
            policy,
            config,
        })
    }

    pub fn policy(&self) -> &SafeHeightPolicy {
        &self.policy
    }

    /// Highest height committed to the block collection.
    pub async fn local_latest(&self) -> SyncResult<Option<u64>> {
        resolve_local_latest(&self.store, BLOCK_COLL, HEIGHT_FIELD).await
    }

    fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            allow_disk_use: self.config.allow_disk_use,
            batch_size: self.config.aggregate_batch_size.max(1),
        }
    }
}

#[async_trait]
impl<C, S> SyncManager for ChainSync<C, S>
where
    C: ChainAdapter,
    S: DocumentStore,
{
    async fn preload(&self, end: Option<u64>) -> SyncResult<PreloadReport> {
        let family = self.chain.family();
        let local_latest = self.local_latest().await?;
        info!("[{}] local latest: {:?}", family, local_latest);

        let remote_tip = self.chain.get_remote_tip_height().await?;
        let safe = self.policy.safe_height(remote_tip);
        info!(
            "[{}] remote tip: {}, safe height: {}, requested end: {:?}",
            family, remote_tip, safe, end
        );

        let Some(range) = self.policy.ingest_range(local_latest, remote_tip, end) else {
            info!("[{}] nothing to preload", family);
            return Ok(PreloadReport::default());
        };

        let report = BlockWriter::new(&self.store).preload(&self.chain, range).await?;
        info!(
            "[{}] preload done: {} blocks, {} txs",
            family, report.blocks, report.transactions
        );
        Ok(report)
    }

    async fn sync(&self) -> SyncResult<()> {
        warn!(
            "[{}] live sync is not implemented, use preload",
            self.chain.family()
        );
        Ok(())
    }

    async fn maintain_state(&self) -> SyncResult<StateReport> {
        let maintainer = StateMaintainer::new(&self.chain, &self.store, self.aggregate_options());
        match maintainer.maintain().await {
            Err(SyncError::Unsupported(reason)) => {
                warn!("[{}] skipping state maintenance: {}", self.chain.family(), reason);
                Ok(StateReport::default())
            }
            other => other,
        }
    }

    async fn check(&self) -> SyncResult<CheckReport> {
        let local_latest = self.local_latest().await?;
        info!("[{}] local latest: {:?}", self.chain.family(), local_latest);
        IntegrityChecker::new(&self.chain, &self.store)
            .check(local_latest)
            .await
    }
}
