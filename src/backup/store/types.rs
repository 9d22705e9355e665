use serde::{Deserialize, Serialize};
use crate::backup::types::SnapshotPayload;

/// Lightweight listing row. `record_count` comes from its own column, the
/// payload is never decoded to build it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub timestamp: i64,
    pub record_count: usize,
}

/// Full view of one snapshot, for a details screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub timestamp: i64,
    pub record_count: usize,
    pub payload: SnapshotPayload,
}

/// A raw row as read back from SQLite, before integrity checks.
#[derive(Debug)]
pub(crate) struct StoredSnapshot {
    pub timestamp: i64,
    pub payload: Vec<u8>,
    pub checksum: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub snapshot_count: usize,
    pub used_bytes: u64,
    pub newest: Option<i64>,
    pub oldest: Option<i64>,
}

/// One row of the shared change-notification log.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub seq: i64,
    pub origin: String,
    pub kind: String,
    pub timestamp: i64,
}
