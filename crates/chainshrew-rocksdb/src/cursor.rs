//! Cursors over grouped distinct values.

use async_trait::async_trait;
use chainshrew_sync::{DistinctCursor, SyncError, SyncResult};
use log::warn;
use rocksdb::{Direction, IteratorMode, WriteBatch, DB};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::keys::prefix_end;

/// Distinct values held in memory.
pub struct MemoryCursor {
    values: VecDeque<Value>,
    batch_size: usize,
}

impl MemoryCursor {
    pub fn new(values: Vec<Value>, batch_size: u32) -> Self {
        Self {
            values: values.into(),
            batch_size: batch_size.max(1) as usize,
        }
    }
}

#[async_trait]
impl DistinctCursor for MemoryCursor {
    async fn next_batch(&mut self) -> SyncResult<Option<Vec<Value>>> {
        if self.values.is_empty() {
            return Ok(None);
        }
        let take = self.batch_size.min(self.values.len());
        Ok(Some(self.values.drain(..take).collect()))
    }
}

/// Distinct values spilled into a scratch key range, read back in key order.
///
/// The range is deleted once the cursor is exhausted or dropped.
pub struct SpillCursor {
    db: Arc<DB>,
    prefix: Vec<u8>,
    resume_from: Vec<u8>,
    batch_size: usize,
    released: bool,
}

impl SpillCursor {
    pub fn new(db: Arc<DB>, prefix: Vec<u8>, batch_size: u32) -> Self {
        Self {
            db,
            resume_from: prefix.clone(),
            prefix,
            batch_size: batch_size.max(1) as usize,
            released: false,
        }
    }

    fn release(&mut self) -> SyncResult<()> {
        if self.released {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        batch.delete_range(&self.prefix, &prefix_end(&self.prefix));
        self.db
            .write(batch)
            .map_err(|e| SyncError::Storage(format!("Failed to release scratch range: {}", e)))?;
        self.released = true;
        Ok(())
    }
}

#[async_trait]
impl DistinctCursor for SpillCursor {
    async fn next_batch(&mut self) -> SyncResult<Option<Vec<Value>>> {
        if self.released {
            return Ok(None);
        }

        let mut values = Vec::with_capacity(self.batch_size);
        let mut last_key = None;
        let iter = self
            .db
            .iterator(IteratorMode::From(&self.resume_from, Direction::Forward));
        for item in iter {
            let (key, value) =
                item.map_err(|e| SyncError::Storage(format!("Failed to read scratch: {}", e)))?;
            if !key.starts_with(&self.prefix) {
                break;
            }
            let value: Value = serde_json::from_slice(&value)
                .map_err(|e| SyncError::Storage(format!("Corrupt scratch entry: {}", e)))?;
            values.push(value);
            last_key = Some(key);
            if values.len() == self.batch_size {
                break;
            }
        }

        match last_key {
            Some(key) => {
                // resume strictly after the last key handed out
                let mut next = key.to_vec();
                next.push(0x00);
                self.resume_from = next;
                Ok(Some(values))
            }
            None => {
                self.release()?;
                Ok(None)
            }
        }
    }
}

impl Drop for SpillCursor {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("{}", e);
        }
    }
}
