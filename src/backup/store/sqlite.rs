use rusqlite::{params, Connection, OptionalExtension, Result, Transaction};
use std::time::Duration;
use super::types::{EventRow, SnapshotMeta, StoredSnapshot};

pub fn init_db(conn: &Connection) -> Result<()> {
    // Other instances on the same file may hold the write lock briefly
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    // INTEGER PRIMARY KEY aliases the rowid: the timestamp is the ordered index.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshots (
            timestamp INTEGER PRIMARY KEY,
            payload BLOB NOT NULL,
            record_count INTEGER NOT NULL,
            checksum INTEGER NOT NULL
        )",
        [],
    )?;

    // Change notifications shared by every process that opens this file.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS backup_events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            channel TEXT NOT NULL,
            origin TEXT NOT NULL,
            kind TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_backup_events_channel ON backup_events(channel, seq)",
        [],
    )?;

    Ok(())
}

pub fn insert_snapshot(
    tx: &Transaction,
    timestamp: i64,
    payload: &[u8],
    record_count: usize,
    checksum: u32,
) -> Result<()> {
    // Colliding keys (another instance, same millisecond) overwrite: last writer wins.
    let mut stmt = tx.prepare_cached(
        "INSERT OR REPLACE INTO snapshots (timestamp, payload, record_count, checksum)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    stmt.execute(params![timestamp, payload, record_count as i64, checksum])?;
    Ok(())
}

pub fn list_meta(conn: &Connection) -> Result<Vec<SnapshotMeta>> {
    let mut stmt = conn.prepare_cached(
        "SELECT timestamp, record_count FROM snapshots ORDER BY timestamp DESC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(SnapshotMeta {
            timestamp: row.get(0)?,
            record_count: row.get::<_, i64>(1)?.max(0) as usize,
        })
    })?;

    let mut listing = Vec::new();
    for meta in rows {
        listing.push(meta?);
    }
    Ok(listing)
}

pub(crate) fn load_snapshot(conn: &Connection, timestamp: i64) -> Result<Option<StoredSnapshot>> {
    let mut stmt = conn.prepare_cached(
        "SELECT timestamp, payload, checksum FROM snapshots WHERE timestamp = ?1",
    )?;

    stmt.query_row(params![timestamp], |row| {
        Ok(StoredSnapshot {
            timestamp: row.get(0)?,
            payload: row.get(1)?,
            checksum: row.get(2)?,
        })
    })
    .optional()
}

pub fn load_record_count(conn: &Connection, timestamp: i64) -> Result<Option<usize>> {
    let mut stmt = conn.prepare_cached("SELECT record_count FROM snapshots WHERE timestamp = ?1")?;
    stmt.query_row(params![timestamp], |row| row.get::<_, i64>(0))
        .optional()
        .map(|count| count.map(|c| c.max(0) as usize))
}

pub fn keys_newest_first(conn: &Connection, limit: usize) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT timestamp FROM snapshots ORDER BY timestamp DESC LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit.min(i64::MAX as usize) as i64], |row| row.get(0))?;

    let mut keys = Vec::new();
    for key in rows {
        keys.push(key?);
    }
    Ok(keys)
}

pub fn delete_snapshot(tx: &Transaction, timestamp: i64) -> Result<usize> {
    let mut stmt = tx.prepare_cached("DELETE FROM snapshots WHERE timestamp = ?1")?;
    stmt.execute(params![timestamp])
}

pub fn count_snapshots(conn: &Connection) -> Result<usize> {
    conn.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get::<_, i64>(0))
        .map(|n| n.max(0) as usize)
}

pub fn key_bounds(conn: &Connection) -> Result<(Option<i64>, Option<i64>)> {
    conn.query_row("SELECT MAX(timestamp), MIN(timestamp) FROM snapshots", [], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })
}

/// Bytes allocated by the database file (pages in use, free pages included).
pub fn used_bytes(conn: &Connection) -> Result<u64> {
    conn.query_row(
        "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n.max(0) as u64)
}

// ========================================
// EVENTS
// ========================================

/// Appends one event and trims the channel to roughly the last `backlog` sequence numbers.
pub fn append_event(
    conn: &Connection,
    channel: &str,
    origin: &str,
    kind: &str,
    timestamp: i64,
    backlog: i64,
) -> Result<i64> {
    conn.prepare_cached(
        "INSERT INTO backup_events (channel, origin, kind, timestamp) VALUES (?1, ?2, ?3, ?4)",
    )?
    .execute(params![channel, origin, kind, timestamp])?;
    let seq = conn.last_insert_rowid();

    conn.prepare_cached("DELETE FROM backup_events WHERE channel = ?1 AND seq <= ?2")?
        .execute(params![channel, seq - backlog])?;
    Ok(seq)
}

pub fn last_event_seq(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM backup_events", [], |row| row.get(0))
}

pub fn events_after(conn: &Connection, channel: &str, after: i64) -> Result<Vec<EventRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT seq, origin, kind, timestamp FROM backup_events
         WHERE channel = ?1 AND seq > ?2 ORDER BY seq",
    )?;

    let rows = stmt.query_map(params![channel, after], |row| {
        Ok(EventRow {
            seq: row.get(0)?,
            origin: row.get(1)?,
            kind: row.get(2)?,
            timestamp: row.get(3)?,
        })
    })?;

    let mut events = Vec::new();
    for event in rows {
        events.push(event?);
    }
    Ok(events)
}
