#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use serde_json::{json, Value};
use snapvault::backup::guard::UnlimitedSpace;
use snapvault::backup::{
    BackupManager, BackupSource, BroadcastHub, EventLogBroadcaster, SnapshotPayload, SnapshotStore, StateHolder,
};
use snapvault::config::BackupConfig;
use tempfile::TempDir;

// ========================================
// HOST STATE DOUBLE
// ========================================

#[derive(Default)]
pub struct MemoryState {
    source: Mutex<BackupSource>,
    restored: Mutex<Vec<SnapshotPayload>>,
}

impl MemoryState {
    pub fn with_entries(entries: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            source: Mutex::new(BackupSource::with_entries(entries)),
            restored: Mutex::new(Vec::new()),
        })
    }

    pub fn set_source(&self, source: BackupSource) {
        *self.source.lock() = source;
    }

    pub fn set_entries(&self, entries: Vec<Value>) {
        self.source.lock().entries = entries;
    }

    pub fn source(&self) -> BackupSource {
        self.source.lock().clone()
    }

    pub fn last_restored(&self) -> Option<SnapshotPayload> {
        self.restored.lock().last().cloned()
    }

    pub fn restore_count(&self) -> usize {
        self.restored.lock().len()
    }
}

impl StateHolder for MemoryState {
    fn capture(&self) -> BackupSource {
        self.source.lock().clone()
    }

    fn replace(&self, payload: SnapshotPayload) {
        self.restored.lock().push(payload);
    }
}

pub fn sample_entries(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({
                "id": format!("entry-{}", i),
                "date": "2025-11-07",
                "start": "09:00",
                "end": "10:00",
                "category": "work",
                "duration": "1",
                "rate": 30,
                "earned": 30
            })
        })
        .collect()
}

// ========================================
// SETUP
// ========================================

pub fn test_config(tmp: &TempDir) -> BackupConfig {
    BackupConfig::with_db_path(tmp.path().join("backups.db"))
}

pub async fn setup_store() -> (SnapshotStore, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(temp_dir.path().join("backups.db"));
    (store, temp_dir)
}

/// Manager on its own hub, so tests never hear each other.
pub async fn setup_manager() -> (BackupManager, Arc<MemoryState>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let state = MemoryState::with_entries(sample_entries(3));
    let hub = BroadcastHub::new();
    let manager = build_manager(test_config(&temp_dir), state.clone(), &hub);
    (manager, state, temp_dir)
}

pub fn build_manager(config: BackupConfig, state: Arc<MemoryState>, hub: &BroadcastHub) -> BackupManager {
    let channel = config.channel_name.clone();
    BackupManager::builder(config, state)
        .broadcaster(hub.connect(&channel))
        .guard(Box::new(UnlimitedSpace))
        .build()
}

/// Manager notified through the database file only, the way a separate
/// process sharing the same profile would be.
pub fn build_manager_over_file(config: BackupConfig, state: Arc<MemoryState>) -> BackupManager {
    let broadcaster = EventLogBroadcaster::connect(&config.db_path, &config.channel_name, Duration::from_millis(20));
    BackupManager::builder(config, state)
        .broadcaster(broadcaster)
        .guard(Box::new(UnlimitedSpace))
        .build()
}

/// Polls `check` until it holds or `limit` elapses.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    loop {
        if check().await {
            return true;
        }
        if start.elapsed() >= limit {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ========================================
// BENCHMARK
// ========================================

pub struct Benchmark {
    pub name: String,
    pub start: Instant,
    pub count: usize,
    pub samples: Vec<Duration>,
}

impl Benchmark {
    pub fn start(name: &str, count: usize) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
            count,
            samples: Vec::with_capacity(count),
        }
    }

    pub fn record(&mut self, duration: Duration) {
        self.samples.push(duration);
    }

    pub fn stop(mut self) {
        let total_duration = self.start.elapsed();
        let ops_sec = self.count as f64 / total_duration.as_secs_f64();

        self.samples.sort();
        let len = self.samples.len();

        let p50 = self.samples.get(len * 50 / 100).unwrap_or(&Duration::ZERO).as_micros();
        let p99 = self.samples.get(len * 99 / 100).unwrap_or(&Duration::ZERO).as_micros();
        let max = self.samples.last().unwrap_or(&Duration::ZERO).as_micros();

        println!("\n{}", self.name);
        println!(" Throughput:   {:.0} ops/sec", ops_sec);
        println!(" Total Time:   {:.2?}", total_duration);
        println!(" Latency (us): p50: {} | p99: {} | MAX: {}", p50, p99, max);
        println!(" Count:        {}\n", self.count);
    }
}
