use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<Config> = OnceLock::new();

// --- CONFIG AGGREGATOR ---

#[derive(Debug, Clone)]
pub struct Config {
    pub log: LogConfig,
    pub backup: BackupConfig,
}

impl Config {
    pub fn global() -> &'static Config {
        CONFIG.get_or_init(Self::load)
    }

    fn load() -> Self {
        dotenv::dotenv().ok();
        Self {
            log: LogConfig::load(),
            backup: BackupConfig::load(),
        }
    }
}

// --- MODULES ---

// LOG
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
}

impl LogConfig {
    fn load() -> Self {
        Self {
            level: get_env("SNAPVAULT_LOG", "info".to_string()),
        }
    }
}

// BACKUP
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub db_path: PathBuf,
    pub channel_name: String,
    // EVICTION config
    pub retention: usize,
    pub eviction_scan_slack: usize,
    // CACHE config
    pub cache_ttl_ms: u64,
    // SCHEDULER config
    pub quiescence_ms: u64,
    pub scheduler_channel_capacity: usize,
    /// How often listeners poll the shared event log.
    pub event_poll_ms: u64,
    // SPACE GUARD config
    pub quota_bytes: u64,
    pub min_free_bytes: u64,
}

impl BackupConfig {
    fn load() -> Self {
        let d = Self::default();
        Self {
            db_path:                    get_env("SNAPVAULT_DB_PATH", d.db_path),
            channel_name:               get_env("SNAPVAULT_CHANNEL", d.channel_name),
            retention:                  get_env("SNAPVAULT_RETENTION", d.retention),
            eviction_scan_slack:        get_env("SNAPVAULT_EVICTION_SLACK", d.eviction_scan_slack),
            cache_ttl_ms:               get_env("SNAPVAULT_CACHE_TTL_MS", d.cache_ttl_ms),
            quiescence_ms:              get_env("SNAPVAULT_QUIESCENCE_MS", d.quiescence_ms),
            scheduler_channel_capacity: get_env("SNAPVAULT_SCHED_CHAN_CAP", d.scheduler_channel_capacity),
            event_poll_ms:              get_env("SNAPVAULT_EVENT_POLL_MS", d.event_poll_ms),
            quota_bytes:                get_env("SNAPVAULT_QUOTA_BYTES", d.quota_bytes),
            min_free_bytes:             get_env("SNAPVAULT_MIN_FREE_BYTES", d.min_free_bytes),
        }
    }

    /// Defaults with the database placed at `db_path`. Used by tests and embedders
    /// that manage their own profile directory.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn quiescence_window(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_ms)
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/backups.db"),
            channel_name: "time-tracker-backups".to_string(),
            retention: 10,
            eviction_scan_slack: 5,
            cache_ttl_ms: 5000,
            quiescence_ms: 1000,
            scheduler_channel_capacity: 1024,
            event_poll_ms: 250,
            quota_bytes: 50 * 1024 * 1024, // 50MB
            min_free_bytes: 1024 * 1024,
        }
    }
}

// --- PRIVATE HELPER ---

fn get_env<T: std::str::FromStr + std::fmt::Debug>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Config error: {} must be valid (got {:?}), using {:?}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
