//! Snapshot Store: timestamp-keyed snapshots in a per-origin SQLite file.
//!
//! The connection is opened lazily on first use, exactly once per store
//! instance, and shared by every later operation. All statements run under one
//! mutex, so a single instance never has two writes in flight.

pub mod sqlite;
pub mod types;

use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use rusqlite::Connection;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::backup::error::{BackupError, BackupResult};
use crate::backup::types::SnapshotPayload;
use crate::utils::current_time_ms;
use sqlite::init_db;
pub use types::{SnapshotInfo, SnapshotMeta, StoreStats};

pub struct SnapshotStore {
    db_path: PathBuf,
    conn: OnceCell<Mutex<Connection>>,
    /// Last timestamp handed out by this instance; keys are strictly increasing.
    last_timestamp: Mutex<i64>,
}

impl SnapshotStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            conn: OnceCell::new(),
            last_timestamp: Mutex::new(0),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Idempotent. A failed open is not memoized, the next call retries.
    pub async fn open(&self) -> BackupResult<()> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&self) -> BackupResult<&Mutex<Connection>> {
        self.conn
            .get_or_try_init(|| async { open_connection(&self.db_path).map(Mutex::new) })
            .await
    }

    pub async fn write(&self, payload: &SnapshotPayload) -> BackupResult<i64> {
        let conn = self.connection().await?;

        let bytes = serde_json::to_vec(payload)
            .map_err(|e| BackupError::WriteFailed(format!("encode payload: {}", e)))?;
        let checksum = crc32fast::hash(&bytes);
        let timestamp = self.next_timestamp();

        let mut conn = conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| BackupError::WriteFailed(format!("begin: {}", e)))?;
        sqlite::insert_snapshot(&tx, timestamp, &bytes, payload.record_count(), checksum)
            .map_err(|e| BackupError::WriteFailed(format!("insert {}: {}", timestamp, e)))?;
        tx.commit()
            .map_err(|e| BackupError::WriteFailed(format!("commit {}: {}", timestamp, e)))?;

        debug!("Snapshot {} written ({} bytes, {} records)", timestamp, bytes.len(), payload.record_count());
        Ok(timestamp)
    }

    /// Newest-first listing, straight from the `record_count` column.
    pub async fn list(&self) -> BackupResult<Vec<SnapshotMeta>> {
        let conn = self.connection().await?;
        let conn = conn.lock();
        sqlite::list_meta(&conn).map_err(read_failed)
    }

    pub async fn get(&self, timestamp: i64) -> BackupResult<SnapshotPayload> {
        let conn = self.connection().await?;
        let stored = {
            let conn = conn.lock();
            sqlite::load_snapshot(&conn, timestamp).map_err(read_failed)?
        };
        let stored = stored.ok_or(BackupError::NotFound(timestamp))?;

        let actual = crc32fast::hash(&stored.payload);
        if actual != stored.checksum {
            return Err(BackupError::ReadFailed(format!(
                "snapshot {}: checksum mismatch (stored {:08x}, computed {:08x})",
                stored.timestamp, stored.checksum, actual
            )));
        }

        serde_json::from_slice(&stored.payload)
            .map_err(|e| BackupError::ReadFailed(format!("snapshot {}: decode payload: {}", timestamp, e)))
    }

    pub async fn info(&self, timestamp: i64) -> BackupResult<SnapshotInfo> {
        let payload = self.get(timestamp).await?;
        Ok(SnapshotInfo {
            timestamp,
            record_count: payload.record_count(),
            payload,
        })
    }

    pub async fn record_count(&self, timestamp: i64) -> BackupResult<usize> {
        let conn = self.connection().await?;
        let conn = conn.lock();
        sqlite::load_record_count(&conn, timestamp)
            .map_err(read_failed)?
            .ok_or(BackupError::NotFound(timestamp))
    }

    /// Idempotent: returns whether a row was actually removed.
    pub async fn delete(&self, timestamp: i64) -> BackupResult<bool> {
        let removed = self.delete_many(&[timestamp]).await?;
        Ok(removed > 0)
    }

    /// Removes every listed key in one transaction. Missing keys are skipped.
    pub async fn delete_many(&self, timestamps: &[i64]) -> BackupResult<usize> {
        if timestamps.is_empty() {
            return Ok(0);
        }
        let conn = self.connection().await?;
        let mut conn = conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| BackupError::WriteFailed(format!("begin: {}", e)))?;

        let mut removed = 0;
        for ts in timestamps {
            removed += sqlite::delete_snapshot(&tx, *ts)
                .map_err(|e| BackupError::WriteFailed(format!("delete {}: {}", ts, e)))?;
        }
        tx.commit()
            .map_err(|e| BackupError::WriteFailed(format!("commit delete: {}", e)))?;
        Ok(removed)
    }

    /// Key-only scan, newest first, at most `limit` keys.
    pub async fn keys_newest_first(&self, limit: usize) -> BackupResult<Vec<i64>> {
        let conn = self.connection().await?;
        let conn = conn.lock();
        sqlite::keys_newest_first(&conn, limit).map_err(read_failed)
    }

    pub async fn used_bytes(&self) -> BackupResult<u64> {
        let conn = self.connection().await?;
        let conn = conn.lock();
        sqlite::used_bytes(&conn).map_err(read_failed)
    }

    pub async fn stats(&self) -> BackupResult<StoreStats> {
        let conn = self.connection().await?;
        let conn = conn.lock();
        let snapshot_count = sqlite::count_snapshots(&conn).map_err(read_failed)?;
        let used_bytes = sqlite::used_bytes(&conn).map_err(read_failed)?;
        let (newest, oldest) = sqlite::key_bounds(&conn).map_err(read_failed)?;
        Ok(StoreStats {
            snapshot_count,
            used_bytes,
            newest,
            oldest,
        })
    }

    fn next_timestamp(&self) -> i64 {
        let mut last = self.last_timestamp.lock();
        let ts = current_time_ms().max(*last + 1);
        *last = ts;
        ts
    }
}

/// Opens and initializes the database file, creating its directory if needed.
pub(crate) fn open_connection(db_path: &Path) -> BackupResult<Connection> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            error!("Cannot create backup directory {:?}: {}", parent, e);
            BackupError::StorageUnavailable(format!("create {:?}: {}", parent, e))
        })?;
    }

    let conn = Connection::open(db_path).map_err(|e| {
        error!("Cannot open backup DB at {:?}: {}", db_path, e);
        BackupError::StorageUnavailable(format!("open {:?}: {}", db_path, e))
    })?;

    init_db(&conn).map_err(|e| {
        error!("Failed to initialize backup DB at {:?}: {}", db_path, e);
        BackupError::StorageUnavailable(format!("init {:?}: {}", db_path, e))
    })?;

    info!("Backup database opened at {:?}", db_path);
    Ok(conn)
}

fn read_failed(e: rusqlite::Error) -> BackupError {
    BackupError::ReadFailed(e.to_string())
}
