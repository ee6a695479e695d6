//! # Chainshrew-Mono: chain-to-document-store ingestion
//!
//! Wires one chain adapter (selected from `--chain`) to the RocksDB document
//! store and runs the requested operations in a fixed order: check, then
//! preload, then state maintenance. Each switch is independent; the first
//! fatal error ends the process with a non-zero exit code.

pub mod transport;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;

use chainshrew_rocksdb::RocksDocumentStore;
use chainshrew_sync::{
    BitcoinAdapter, ChainAdapter, ChainFamily, ChainSync, DocumentStore, EthereumAdapter,
    SyncConfig, SyncManager, TronAdapter,
};

use crate::transport::HttpRpcTransport;

/// Command-line arguments for `chainshrew-mono`.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Chain name; must contain `eth`, `btc` or `tron`
    #[arg(long, env = "CHAIN")]
    pub chain: String,
    /// Store directory; defaults to `<chain>rpc`. Collection names are shared
    /// by every chain, so each chain needs its own directory.
    #[arg(long)]
    pub db_path: Option<PathBuf>,
    /// Upper bound for preload, inclusive
    #[arg(long)]
    pub end: Option<u64>,
    #[arg(long)]
    pub check: bool,
    #[arg(long)]
    pub preload: bool,
    #[arg(long)]
    pub state: bool,
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: String,
    /// `user:pass`, overriding credentials embedded in the RPC URL
    #[arg(long)]
    pub auth: Option<String>,
    /// Tron JSON-RPC endpoint; defaults to `<rpc-url>/jsonrpc`
    #[arg(long)]
    pub tron_jsonrpc_url: Option<String>,
    #[arg(long)]
    pub bucket_size: Option<u64>,
    #[arg(long, default_value_t = 1)]
    pub aggregate_batch_size: u32,
}

impl Args {
    pub fn family(&self) -> Result<ChainFamily> {
        Ok(ChainFamily::from_chain_name(&self.chain)?)
    }

    pub fn sync_config(&self, family: ChainFamily) -> SyncConfig {
        let defaults = SyncConfig::for_family(family);
        SyncConfig {
            bucket_size: self.bucket_size.unwrap_or(defaults.bucket_size),
            aggregate_batch_size: self.aggregate_batch_size,
            ..defaults
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}rpc", self.chain)))
    }

    pub fn tron_jsonrpc_url(&self) -> String {
        self.tron_jsonrpc_url
            .clone()
            .unwrap_or_else(|| format!("{}/jsonrpc", self.rpc_url.trim_end_matches('/')))
    }
}

/// Main run function, generic over the chain adapter and the store.
pub async fn run<C, S>(args: Args, chain: C, store: S) -> Result<()>
where
    C: ChainAdapter,
    S: DocumentStore,
{
    let family = chain.family();
    let sync = ChainSync::new(chain, store, args.sync_config(family))?;
    info!(
        "[{}] bucket size {}, aggregate batch size {}",
        family,
        sync.policy().bucket_size(),
        sync.config.aggregate_batch_size
    );

    if args.check {
        let report = sync.check().await?;
        info!(
            "[{}] check: {} heights, {}/{} txs inserted",
            family, report.heights, report.inserted, report.total
        );
    }

    if args.preload {
        let report = sync.preload(args.end).await?;
        info!(
            "[{}] preload: {} blocks, {} txs ({:?}..={:?})",
            family, report.blocks, report.transactions, report.from, report.to
        );
    }

    if args.state {
        let report = sync.maintain_state().await?;
        info!("[{}] state: {} addresses", family, report.addresses);
    }

    if !(args.check || args.preload || args.state) {
        sync.sync().await?;
    }

    Ok(())
}

/// Production-specific run function.
pub async fn run_prod(args: Args) -> Result<()> {
    let family = args.family()?;

    let db_path = args.db_path();
    info!("Opening document store at {}", db_path.display());
    let store = RocksDocumentStore::open_optimized(db_path.to_string_lossy().to_string())?;

    let transport = HttpRpcTransport::new(&args.rpc_url, args.auth.as_deref())?;
    info!("[{}] node at {}", family, transport.url());

    match family {
        ChainFamily::Bitcoin => run(args, BitcoinAdapter::new(transport), store).await,
        ChainFamily::Ethereum => run(args, EthereumAdapter::new(transport), store).await,
        ChainFamily::Tron => {
            let jsonrpc = HttpRpcTransport::new(&args.tron_jsonrpc_url(), args.auth.as_deref())?;
            run(args, TronAdapter::new(transport, jsonrpc), store).await
        }
    }
}
