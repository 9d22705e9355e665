//! Pre-write storage-space guard.
//!
//! Consulted before every scheduled and manual snapshot. A tripped guard skips
//! the write instead of letting the database hit a full disk mid-transaction.

use std::path::{Path, PathBuf};
use serde::Serialize;
use tracing::debug;
use crate::backup::error::BackupError;

/// Writes are refused once this share of the quota is in use.
const QUOTA_HIGH_WATER: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceReport {
    pub used_bytes: u64,
    pub quota_bytes: u64,
    /// `None` when the host cannot report free disk space.
    pub free_bytes: Option<u64>,
    pub percent_used: f64,
    pub has_space: bool,
}

impl SpaceReport {
    pub fn to_error(&self) -> BackupError {
        BackupError::InsufficientSpace {
            used_bytes: self.used_bytes,
            quota_bytes: self.quota_bytes,
            free_bytes: self.free_bytes.unwrap_or(0),
        }
    }
}

pub trait SpaceGuard: Send + Sync {
    fn check(&self, used_bytes: u64) -> SpaceReport;
}

/// Quota on the database size plus a floor on free disk space in its directory.
pub struct QuotaGuard {
    dir: PathBuf,
    quota_bytes: u64,
    min_free_bytes: u64,
}

impl QuotaGuard {
    pub fn new(db_path: &Path, quota_bytes: u64, min_free_bytes: u64) -> Self {
        let dir = db_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            dir,
            quota_bytes,
            min_free_bytes,
        }
    }

    fn free_bytes(&self) -> Option<u64> {
        match fs2::available_space(&self.dir) {
            Ok(free) => Some(free),
            Err(e) => {
                debug!("Free space unknown for {:?}: {}", self.dir, e);
                None
            }
        }
    }
}

impl SpaceGuard for QuotaGuard {
    fn check(&self, used_bytes: u64) -> SpaceReport {
        let free_bytes = self.free_bytes();
        let percent_used = if self.quota_bytes == 0 {
            100.0
        } else {
            used_bytes as f64 * 100.0 / self.quota_bytes as f64
        };
        let under_quota = (used_bytes as f64) < self.quota_bytes as f64 * QUOTA_HIGH_WATER;
        let disk_ok = free_bytes.map_or(true, |free| free >= self.min_free_bytes);

        SpaceReport {
            used_bytes,
            quota_bytes: self.quota_bytes,
            free_bytes,
            percent_used,
            has_space: under_quota && disk_ok,
        }
    }
}

/// Never trips. For hosts that manage disk space themselves.
pub struct UnlimitedSpace;

impl SpaceGuard for UnlimitedSpace {
    fn check(&self, used_bytes: u64) -> SpaceReport {
        SpaceReport {
            used_bytes,
            quota_bytes: u64::MAX,
            free_bytes: None,
            percent_used: 0.0,
            has_space: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(quota: u64, min_free: u64) -> QuotaGuard {
        QuotaGuard::new(&std::env::temp_dir().join("backups.db"), quota, min_free)
    }

    #[test]
    fn trips_at_ninety_percent_of_quota() {
        let g = guard(1000, 0);
        assert!(g.check(899).has_space);

        let report = g.check(900);
        assert!(!report.has_space);
        assert_eq!(report.percent_used, 90.0);
        assert!(matches!(report.to_error(), BackupError::InsufficientSpace { used_bytes: 900, .. }));
    }

    #[test]
    fn trips_when_disk_floor_unreachable() {
        let report = guard(u64::MAX, u64::MAX).check(0);
        // temp_dir always reports free space on supported hosts
        if report.free_bytes.is_some() {
            assert!(!report.has_space);
        }
    }

    #[test]
    fn zero_quota_never_has_space() {
        let report = guard(0, 0).check(0);
        assert!(!report.has_space);
        assert_eq!(report.percent_used, 100.0);
    }

    #[test]
    fn relative_db_path_uses_current_dir() {
        let g = QuotaGuard::new(Path::new("backups.db"), 10, 0);
        assert_eq!(g.dir, PathBuf::from("."));
    }
}
