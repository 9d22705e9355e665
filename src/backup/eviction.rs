//! Eviction Policy: keeps the newest `retention` snapshots, drops the rest.
//!
//! Each pass scans at most `retention + scan_slack` keys, so one pass deletes at
//! most `scan_slack` snapshots. Since a pass runs after every write and the slack
//! is at least 2, a backlog beyond the window shrinks by at least one per write
//! until it is gone.

use tracing::{debug, info};
use crate::backup::error::BackupResult;
use crate::backup::store::SnapshotStore;

const MIN_SCAN_SLACK: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct EvictionPolicy {
    retention: usize,
    scan_slack: usize,
}

impl EvictionPolicy {
    pub fn new(retention: usize, scan_slack: usize) -> Self {
        Self {
            // The newest snapshot is never evicted.
            retention: retention.max(1),
            scan_slack: scan_slack.max(MIN_SCAN_SLACK),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// One bounded pass. Returns how many snapshots were deleted.
    pub async fn prune(&self, store: &SnapshotStore) -> BackupResult<usize> {
        let keys = store.keys_newest_first(self.retention + self.scan_slack).await?;
        if keys.len() <= self.retention {
            return Ok(0);
        }

        let victims = &keys[self.retention..];
        let removed = store.delete_many(victims).await?;
        debug!("Eviction removed {} snapshot(s) beyond retention {}", removed, self.retention);
        Ok(removed)
    }

    /// Repeats bounded passes until nothing is left beyond the window.
    pub async fn prune_all(&self, store: &SnapshotStore) -> BackupResult<usize> {
        let mut total = 0;
        loop {
            let removed = self.prune(store).await?;
            if removed == 0 {
                break;
            }
            total += removed;
        }
        if total > 0 {
            info!("Eviction removed {} snapshot(s) in full sweep", total);
        }
        Ok(total)
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::new(10, 5)
    }
}
