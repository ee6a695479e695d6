//! Error types for chainshrew-sync

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Chain RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unknown height: {0}")]
    UnknownHeight(String),

    #[error("Invalid receipts len at height {height}: {transactions} txs, {receipts} receipts")]
    ReceiptMismatch {
        height: u64,
        transactions: usize,
        receipts: usize,
    },

    #[error("Decode error at height {height}: {message}")]
    Decode { height: u64, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
