use thiserror::Error;

/// Failure taxonomy of the backup subsystem.
///
/// None of these are fatal to the host: background paths log and swallow them,
/// explicit calls hand them back to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackupError {
    /// The embedded database cannot be opened. Backups are disabled for this instance.
    #[error("backup storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A single write transaction failed.
    #[error("snapshot write failed: {0}")]
    WriteFailed(String),

    /// A record exists but could not be read or decoded.
    #[error("snapshot read failed: {0}")]
    ReadFailed(String),

    #[error("snapshot {0} not found")]
    NotFound(i64),

    /// The pre-write space guard tripped; nothing was written.
    #[error("insufficient space for backup: {used_bytes} of {quota_bytes} bytes used, {free_bytes} free on disk")]
    InsufficientSpace {
        used_bytes: u64,
        quota_bytes: u64,
        free_bytes: u64,
    },
}

impl BackupError {
    /// Absence or unreadability of a record is a normal state, not an error,
    /// at the public surface.
    pub fn is_missing(&self) -> bool {
        matches!(self, BackupError::NotFound(_) | BackupError::ReadFailed(_))
    }
}

pub type BackupResult<T> = Result<T, BackupError>;
