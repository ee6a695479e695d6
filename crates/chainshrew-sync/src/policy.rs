//! Safe-height policy.

use std::ops::RangeInclusive;

use crate::{SyncError, SyncResult};

/// Rounds the remote tip down to a bucket boundary so heights close to the
/// tip, which may still be reorganized, are never ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeHeightPolicy {
    bucket_size: u64,
}

impl SafeHeightPolicy {
    pub fn new(bucket_size: u64) -> SyncResult<Self> {
        if bucket_size == 0 {
            return Err(SyncError::Config("bucket size must be positive".to_string()));
        }
        Ok(Self { bucket_size })
    }

    pub fn bucket_size(&self) -> u64 {
        self.bucket_size
    }

    /// `floor(tip / bucket) * bucket`
    pub fn safe_height(&self, remote_tip: u64) -> u64 {
        remote_tip / self.bucket_size * self.bucket_size
    }

    /// Heights to ingest after `local_latest`, bounded by the safe height and
    /// by `end` when one is requested. `None` when there is nothing to do.
    pub fn ingest_range(
        &self,
        local_latest: Option<u64>,
        remote_tip: u64,
        end: Option<u64>,
    ) -> Option<RangeInclusive<u64>> {
        let start = match local_latest {
            Some(h) => h.checked_add(1)?,
            None => 0,
        };
        let safe = self.safe_height(remote_tip);
        let bound = end.map_or(safe, |end| end.min(safe));
        (start <= bound).then(|| start..=bound)
    }
}
