use std::time::{SystemTime, UNIX_EPOCH};
use chrono::{DateTime, Local, Utc};

pub fn current_time_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Human-readable local time for a snapshot timestamp (ms since epoch).
pub fn format_time(timestamp_ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(timestamp_ms) {
        Some(dt) => dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("<invalid {}>", timestamp_ms),
    }
}
