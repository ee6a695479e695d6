//! Chain ingestion engine: checkpointed preload, integrity check and
//! account state maintenance for Bitcoin, Ethereum and Tron style chains.

pub mod chains;
pub mod checkpoint;
pub mod error;
pub mod integrity;
pub mod policy;
pub mod state;
pub mod sync;
pub mod traits;
pub mod types;
pub mod writer;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use chains::{BitcoinAdapter, EthereumAdapter, TronAdapter};
pub use checkpoint::*;
pub use error::*;
pub use integrity::*;
pub use policy::*;
pub use state::*;
pub use sync::*;
pub use traits::*;
pub use types::*;
pub use writer::*;
