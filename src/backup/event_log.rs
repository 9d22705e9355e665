//! Cross-process change notifications relayed through the backup database.
//!
//! Every process that opens the same file sees the same `backup_events` table.
//! A publish appends a row tagged with the handle's origin. Each subscription
//! polls for rows past the last sequence number it has seen and skips its own
//! origin. Publishing trims old rows, so the table stays small; a listener only
//! misses events if it falls more than [`EVENT_BACKLOG`] sequence numbers behind.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use rusqlite::Connection;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backup::broadcast::{BackupEvent, Broadcaster, ChangeCallback, ChangeKind, NoopBroadcaster, Subscription};
use crate::backup::error::BackupResult;
use crate::backup::store::{open_connection, sqlite};

pub const EVENT_BACKLOG: i64 = 1024;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct EventLogBroadcaster {
    origin: Uuid,
    channel: String,
    conn: Arc<Mutex<Connection>>,
    poll_interval: Duration,
    closed: AtomicBool,
}

impl EventLogBroadcaster {
    /// Opens a dedicated connection to `db_path`; listeners poll every `poll_interval`.
    pub fn open(db_path: &Path, channel: &str, poll_interval: Duration) -> BackupResult<Self> {
        let conn = open_connection(db_path)?;
        Ok(Self {
            origin: Uuid::new_v4(),
            channel: channel.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            closed: AtomicBool::new(false),
        })
    }

    /// Like [`open`](Self::open), but degrades to a [`NoopBroadcaster`] when the
    /// database cannot be opened or no tokio runtime is running.
    pub fn connect(db_path: &Path, channel: &str, poll_interval: Duration) -> Arc<dyn Broadcaster> {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No async runtime: change notifications disabled for channel '{}'", channel);
            return Arc::new(NoopBroadcaster);
        }
        match Self::open(db_path, channel, poll_interval) {
            Ok(broadcaster) => Arc::new(broadcaster),
            Err(e) => {
                warn!("Change notifications disabled for channel '{}': {}", channel, e);
                Arc::new(NoopBroadcaster)
            }
        }
    }
}

impl Broadcaster for EventLogBroadcaster {
    fn publish(&self, kind: ChangeKind, timestamp: i64) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let conn = self.conn.lock();
        let origin = self.origin.to_string();
        match sqlite::append_event(&conn, &self.channel, &origin, kind.as_str(), timestamp, EVENT_BACKLOG) {
            Ok(seq) => debug!("Channel '{}': logged {:?} {} as #{}", self.channel, kind, timestamp, seq),
            Err(e) => warn!("Channel '{}': publishing {:?} {} failed: {}", self.channel, kind, timestamp, e),
        }
    }

    fn subscribe(&self, callback: ChangeCallback) -> Subscription {
        // Only events published after this point are delivered.
        let start = match sqlite::last_event_seq(&self.conn.lock()) {
            Ok(seq) => seq,
            Err(e) => {
                warn!("Channel '{}': cannot read event log, listener disabled: {}", self.channel, e);
                return Subscription::inert();
            }
        };

        let conn = Arc::clone(&self.conn);
        let channel = self.channel.clone();
        let origin = self.origin.to_string();
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut cursor = start;
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let batch = {
                    let conn = conn.lock();
                    sqlite::events_after(&conn, &channel, cursor)
                };
                let rows = match batch {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!("Channel '{}': polling event log failed: {}", channel, e);
                        continue;
                    }
                };

                for row in rows {
                    cursor = row.seq;
                    if row.origin == origin {
                        continue; // own message
                    }
                    match ChangeKind::parse(&row.kind) {
                        Some(kind) => {
                            let event = BackupEvent { kind, timestamp: row.timestamp };
                            debug!("Channel '{}': received {:?}", channel, event);
                            callback(event);
                        }
                        None => warn!("Channel '{}': skipping unknown event kind '{}'", channel, row.kind),
                    }
                }
            }
        });

        Subscription::listening(task)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
