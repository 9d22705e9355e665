pub mod backup_manager;
pub mod broadcast;
pub mod cache;
pub mod error;
pub mod event_log;
pub mod eviction;
pub mod guard;
pub mod normalizer;
pub mod scheduler;
pub mod store;
pub mod types;

pub use backup_manager::*;
pub use broadcast::{BackupEvent, BroadcastHub, Broadcaster, ChangeKind, NoopBroadcaster, Subscription};
pub use error::{BackupError, BackupResult};
pub use event_log::EventLogBroadcaster;
pub use store::{SnapshotInfo, SnapshotMeta, SnapshotStore};
pub use types::*;
