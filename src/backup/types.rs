use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shape version written into every payload.
pub const PAYLOAD_VERSION: u32 = 1;

// ========================================
// INPUT - live host state
// ========================================

/// Everything the host hands over when a snapshot is taken.
///
/// Entries arrive as loose JSON straight from the records store, so numeric
/// fields may be strings and transient UI fields may be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupSource {
    pub entries: Vec<Value>,
    pub categories: Option<Vec<Value>>,
    pub daily_goal: Option<f64>,
    pub daily_hours: Option<f64>,
    pub theme: Option<String>,
}

impl BackupSource {
    pub fn with_entries(entries: Vec<Value>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }
}

// ========================================
// OUTPUT - persisted payload
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub version: u32,
    #[serde(default)]
    pub entries: Vec<EntryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_goal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

impl SnapshotPayload {
    /// Size of the tracked collection, stored next to the blob for listings.
    pub fn record_count(&self) -> usize {
        self.entries.len()
    }

    pub fn has_settings(&self) -> bool {
        self.categories.is_some()
            || self.daily_goal.is_some()
            || self.daily_hours.is_some()
            || self.theme.is_some()
    }
}

/// One time-tracking record, restricted to the persisted whitelist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub earned: f64,
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub is_manual: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Hourly rate override for entries in this category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}
