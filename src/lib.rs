pub mod backup;
pub mod config;
pub mod utils;

pub use crate::backup::{BackupError, BackupManager, StateHolder};
pub use crate::config::Config;
