//! Metadata List Cache: the last listing, served while younger than the TTL.
//!
//! Lifecycle: Empty -> Fresh -> Stale -> Empty. Any write, delete or explicit
//! invalidation drops straight back to Empty. A generation counter stops a slow
//! refill from publishing a listing that was invalidated while it was loading.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::backup::store::SnapshotMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Fresh,
    Stale,
}

struct CacheEntry {
    listing: Vec<SnapshotMeta>,
    cached_at: Instant,
}

pub struct MetadataCache {
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
    generation: AtomicU64,
}

/// Ticket handed out before a refill; only a ticket from the current
/// generation may populate the cache.
#[derive(Debug, Clone, Copy)]
pub struct FillTicket(u64);

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn state(&self) -> CacheState {
        match &*self.entry.lock() {
            None => CacheState::Empty,
            Some(e) if e.cached_at.elapsed() < self.ttl => CacheState::Fresh,
            Some(_) => CacheState::Stale,
        }
    }

    /// The cached listing, only while Fresh.
    pub fn get(&self) -> Option<Vec<SnapshotMeta>> {
        match &*self.entry.lock() {
            Some(e) if e.cached_at.elapsed() < self.ttl => Some(e.listing.clone()),
            _ => None,
        }
    }

    pub fn begin_fill(&self) -> FillTicket {
        FillTicket(self.generation.load(Ordering::Acquire))
    }

    /// Stores `listing` unless an invalidation happened since `ticket` was taken.
    /// Returns whether the listing was kept.
    pub fn fill(&self, ticket: FillTicket, listing: Vec<SnapshotMeta>) -> bool {
        let mut entry = self.entry.lock();
        if self.generation.load(Ordering::Acquire) != ticket.0 {
            return false;
        }
        *entry = Some(CacheEntry {
            listing,
            cached_at: Instant::now(),
        });
        true
    }

    pub fn invalidate(&self) {
        let mut entry = self.entry.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *entry = None;
    }
}

// ==========================================
// TESTS
// ==========================================
