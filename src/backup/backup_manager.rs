//! Backup Manager: the public face of the snapshot subsystem.
//!
//! Hosts drive it with `signal_mutation()` after every data change and call the
//! manual operations (backup now, restore, list, delete) from their UI. Nothing
//! here returns an error the host has to handle in its primary flow: background
//! failures are logged, explicit calls get a `Result`, `bool` or empty listing.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backup::broadcast::{BackupEvent, Broadcaster, ChangeCallback, ChangeKind, Subscription};
use crate::backup::event_log::EventLogBroadcaster;
use crate::backup::cache::{CacheState, MetadataCache};
use crate::backup::error::BackupResult;
use crate::backup::eviction::EvictionPolicy;
use crate::backup::guard::{QuotaGuard, SpaceGuard, SpaceReport};
use crate::backup::normalizer::normalize;
use crate::backup::scheduler::WriteScheduler;
use crate::backup::store::{SnapshotInfo, SnapshotMeta, SnapshotStore};
use crate::backup::types::{BackupSource, SnapshotPayload};
use crate::config::BackupConfig;

/// The host's live state, as seen by the backup subsystem.
pub trait StateHolder: Send + Sync {
    /// Current records and settings, read when a snapshot is taken.
    fn capture(&self) -> BackupSource;

    /// Wholesale replacement after a successful restore: the tracked collection
    /// always, settings only where the payload carries them.
    fn replace(&self, payload: SnapshotPayload);
}

// ========================================
// CORE - shared by the manager and the scheduler actor
// ========================================

pub(crate) struct BackupCore {
    store: SnapshotStore,
    eviction: EvictionPolicy,
    cache: MetadataCache,
    broadcaster: Arc<dyn Broadcaster>,
    guard: Box<dyn SpaceGuard>,
    state: Arc<dyn StateHolder>,
}

impl BackupCore {
    async fn space_report(&self) -> BackupResult<SpaceReport> {
        let used = self.store.used_bytes().await?;
        Ok(self.guard.check(used))
    }

    /// guard -> normalize -> write -> prune -> invalidate -> publish.
    /// Used by both the scheduled and the manual path.
    pub(crate) async fn snapshot_now(&self) -> BackupResult<i64> {
        let report = self.space_report().await?;
        if !report.has_space {
            return Err(report.to_error());
        }

        let payload = normalize(&self.state.capture());
        let timestamp = self.store.write(&payload).await?;

        if let Err(e) = self.eviction.prune(&self.store).await {
            warn!("Eviction after snapshot {} failed: {}", timestamp, e);
        }

        self.cache.invalidate();
        self.broadcaster.publish(ChangeKind::Created, timestamp);
        Ok(timestamp)
    }
}

// ========================================
// BUILDER
// ========================================

pub struct BackupManagerBuilder {
    config: BackupConfig,
    state: Arc<dyn StateHolder>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    guard: Option<Box<dyn SpaceGuard>>,
}

impl BackupManagerBuilder {
    /// Defaults to an [`EventLogBroadcaster`] on the backup database, which
    /// reaches every process that opens the same file.
    pub fn broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Defaults to a [`QuotaGuard`] built from the config.
    pub fn guard(mut self, guard: Box<dyn SpaceGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Must be called inside a tokio runtime: the scheduler runs as a task.
    pub fn build(self) -> BackupManager {
        let config = self.config;
        let broadcaster = self
            .broadcaster
            .unwrap_or_else(|| {
                EventLogBroadcaster::connect(&config.db_path, &config.channel_name, config.event_poll_interval())
            });
        let guard = self.guard.unwrap_or_else(|| {
            Box::new(QuotaGuard::new(&config.db_path, config.quota_bytes, config.min_free_bytes))
        });

        let core = Arc::new(BackupCore {
            store: SnapshotStore::new(config.db_path.clone()),
            eviction: EvictionPolicy::new(config.retention, config.eviction_scan_slack),
            cache: MetadataCache::new(config.cache_ttl()),
            broadcaster,
            guard,
            state: self.state,
        });

        // Changes made by other instances make our listing stale.
        let invalidate_core = Arc::clone(&core);
        let invalidation = core.broadcaster.subscribe(Arc::new(move |_event: BackupEvent| {
            invalidate_core.cache.invalidate();
        }));

        let scheduler = WriteScheduler::spawn(
            Arc::clone(&core),
            config.quiescence_window(),
            config.scheduler_channel_capacity,
        );

        info!(
            "Backup manager ready (db {:?}, retention {}, window {:?})",
            config.db_path,
            core.eviction.retention(),
            scheduler.window()
        );

        BackupManager {
            core,
            scheduler,
            invalidation: Some(invalidation),
        }
    }
}

// ========================================
// MANAGER
// ========================================

pub struct BackupManager {
    core: Arc<BackupCore>,
    scheduler: WriteScheduler,
    invalidation: Option<Subscription>,
}

impl BackupManager {
    pub fn builder(config: BackupConfig, state: Arc<dyn StateHolder>) -> BackupManagerBuilder {
        BackupManagerBuilder {
            config,
            state,
            broadcaster: None,
            guard: None,
        }
    }

    pub fn new(config: BackupConfig, state: Arc<dyn StateHolder>) -> Self {
        Self::builder(config, state).build()
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.core.store
    }

    pub fn cache_state(&self) -> CacheState {
        self.core.cache.state()
    }

    // --- SCHEDULED PATH ---

    /// Call after every create/update/delete/import/clear on the records.
    pub fn signal_mutation(&self) {
        self.scheduler.signal_mutation();
    }

    /// Drops a pending scheduled write. Returns whether one was pending.
    pub async fn cancel_pending(&self) -> bool {
        self.scheduler.cancel_pending().await
    }

    // --- MANUAL PATH ---

    /// "Back up now": bypasses the scheduler, same side effects.
    pub async fn create_manual_snapshot(&self) -> BackupResult<i64> {
        match self.core.snapshot_now().await {
            Ok(ts) => {
                info!("Manual backup saved: {}", ts);
                Ok(ts)
            }
            Err(e) => {
                error!("Manual backup failed: {}", e);
                Err(e)
            }
        }
    }

    /// On failure the host state is left untouched.
    pub async fn restore_snapshot(&self, timestamp: i64) -> bool {
        match self.core.store.get(timestamp).await {
            Ok(payload) => {
                let count = payload.record_count();
                self.core.state.replace(payload);
                info!("Restored snapshot {} ({} records)", timestamp, count);
                true
            }
            Err(e) if e.is_missing() => {
                warn!("Restore skipped: {}", e);
                false
            }
            Err(e) => {
                error!("Restore of snapshot {} failed: {}", timestamp, e);
                false
            }
        }
    }

    /// Newest first. Served from the cache while fresh unless `force_refresh`.
    pub async fn list_snapshots(&self, force_refresh: bool) -> Vec<SnapshotMeta> {
        let cache = &self.core.cache;
        if !force_refresh {
            if let Some(listing) = cache.get() {
                return listing;
            }
        }

        let ticket = cache.begin_fill();
        match self.core.store.list().await {
            Ok(listing) => {
                cache.fill(ticket, listing.clone());
                listing
            }
            Err(e) => {
                error!("Listing snapshots failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Deleting a snapshot that does not exist succeeds.
    pub async fn delete_snapshot(&self, timestamp: i64) -> bool {
        match self.core.store.delete(timestamp).await {
            Ok(removed) => {
                self.core.cache.invalidate();
                if removed {
                    self.core.broadcaster.publish(ChangeKind::Deleted, timestamp);
                    info!("Snapshot {} deleted", timestamp);
                }
                true
            }
            Err(e) => {
                error!("Deleting snapshot {} failed: {}", timestamp, e);
                false
            }
        }
    }

    pub async fn snapshot_info(&self, timestamp: i64) -> Option<SnapshotInfo> {
        match self.core.store.info(timestamp).await {
            Ok(info) => Some(info),
            Err(e) => {
                if !e.is_missing() {
                    error!("Reading snapshot {} failed: {}", timestamp, e);
                }
                None
            }
        }
    }

    pub async fn storage_report(&self) -> BackupResult<SpaceReport> {
        self.core.space_report().await
    }

    /// Live notifications about snapshots created or deleted by other instances.
    /// The cache is already invalidated when `callback` runs.
    pub fn on_backup_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(BackupEvent) + Send + Sync + 'static,
    {
        let core = Arc::clone(&self.core);
        let wrapped: ChangeCallback = Arc::new(move |event| {
            core.cache.invalidate();
            callback(event);
        });
        self.core.broadcaster.subscribe(wrapped)
    }

    /// Teardown: writes any pending coalesced snapshot, stops the scheduler
    /// and detaches from the change channel.
    pub async fn close(&mut self) {
        // The scheduler already logs a failed final write.
        let _ = self.scheduler.flush().await;
        self.scheduler.stop().await;
        if let Some(sub) = self.invalidation.take() {
            sub.unsubscribe();
        }
        self.core.broadcaster.close();
    }
}
