//! Cross-instance change notifications.
//!
//! Every instance that shares one backup database binds a handle to the same
//! channel name. A publish reaches every other handle on that channel, never
//! the publisher itself. Messages carry only identifiers; receivers re-query the
//! store for data.
//!
//! Two transports implement [`Broadcaster`]: the database-backed relay in
//! [`crate::backup::event_log`], which reaches other processes on the same file,
//! and [`BroadcastHub`] channels, which stay inside one process. When neither
//! can be set up the host gets a [`NoopBroadcaster`]: publishing and subscribing
//! still work, nothing is ever delivered, and each instance falls back on its
//! cache TTL.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

// ==========================================
// MESSAGES
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Deleted => "deleted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created" => Some(ChangeKind::Created),
            "deleted" => Some(ChangeKind::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEvent {
    pub kind: ChangeKind,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
struct Envelope {
    origin: Uuid,
    event: BackupEvent,
}

pub type ChangeCallback = Arc<dyn Fn(BackupEvent) + Send + Sync>;

// ==========================================
// CAPABILITY
// ==========================================

pub trait Broadcaster: Send + Sync {
    /// Fire-and-forget.
    fn publish(&self, kind: ChangeKind, timestamp: i64);

    /// `callback` runs once per message from another handle. Listening stops
    /// when the returned [`Subscription`] is unsubscribed or dropped.
    fn subscribe(&self, callback: ChangeCallback) -> Subscription;

    /// After close, publishing is a no-op.
    fn close(&self);
}

/// Listener registration. Unsubscribes on drop.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn listening(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A subscription that never receives anything.
    pub fn inert() -> Self {
        Self { task: None }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

// ==========================================
// HUB
// ==========================================

/// Registry of named in-process channels shared by every instance attached to it.
pub struct BroadcastHub {
    channels: DashMap<String, broadcast::Sender<Envelope>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    fn sender(&self, name: &str) -> broadcast::Sender<Envelope> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .value()
            .clone()
    }

    /// A fresh handle on `name`, or the no-op fallback when called outside a
    /// tokio runtime (listeners need a task to run on).
    pub fn connect(&self, name: &str) -> Arc<dyn Broadcaster> {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No async runtime: change notifications disabled for channel '{}'", name);
            return Arc::new(NoopBroadcaster);
        }
        Arc::new(ChannelBroadcaster::new(name, self.sender(name)))
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// CHANNEL-BACKED
// ==========================================

pub struct ChannelBroadcaster {
    origin: Uuid,
    name: String,
    sender: broadcast::Sender<Envelope>,
    closed: AtomicBool,
}

impl ChannelBroadcaster {
    fn new(name: &str, sender: broadcast::Sender<Envelope>) -> Self {
        Self {
            origin: Uuid::new_v4(),
            name: name.to_string(),
            sender,
            closed: AtomicBool::new(false),
        }
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, kind: ChangeKind, timestamp: i64) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let event = BackupEvent { kind, timestamp };
        // Err only means nobody is listening right now.
        let delivered = self
            .sender
            .send(Envelope { origin: self.origin, event })
            .unwrap_or(0);
        debug!("Channel '{}': published {:?} to {} receiver(s)", self.name, event, delivered);
    }

    fn subscribe(&self, callback: ChangeCallback) -> Subscription {
        let mut rx = self.sender.subscribe();
        let origin = self.origin;
        let name = self.name.clone();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) if envelope.origin != origin => {
                        debug!("Channel '{}': received {:?}", name, envelope.event);
                        callback(envelope.event);
                    }
                    Ok(_) => {} // own message
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Channel '{}': listener lagged, {} message(s) dropped", name, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Subscription::listening(task)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

// ==========================================
// NO-OP
// ==========================================

pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn publish(&self, _kind: ChangeKind, _timestamp: i64) {}

    fn subscribe(&self, _callback: ChangeCallback) -> Subscription {
        Subscription::inert()
    }

    fn close(&self) {}
}
