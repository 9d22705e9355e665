//! Snapshot Normalizer: shapes live host state into the compact persisted payload.
//!
//! Pure and deterministic. Only whitelisted entry fields survive, numeric fields
//! are coerced, and nothing time-dependent is injected.

use serde_json::{Map, Value};
use crate::backup::types::{BackupSource, Category, EntryRecord, SnapshotPayload, PAYLOAD_VERSION};

pub fn normalize(source: &BackupSource) -> SnapshotPayload {
    SnapshotPayload {
        version: PAYLOAD_VERSION,
        entries: source
            .entries
            .iter()
            .filter_map(Value::as_object)
            .map(normalize_entry)
            .collect(),
        categories: source.categories.as_ref().map(|cats| {
            cats.iter()
                .filter_map(Value::as_object)
                .filter_map(normalize_category)
                .collect()
        }),
        daily_goal: source.daily_goal.filter(|v| v.is_finite()),
        daily_hours: source.daily_hours.filter(|v| v.is_finite()),
        theme: source.theme.clone(),
    }
}

fn normalize_entry(raw: &Map<String, Value>) -> EntryRecord {
    // An empty category falls back to the legacy categoryId field.
    let category = text(raw.get("category"))
        .filter(|c| !c.is_empty())
        .or_else(|| text(raw.get("categoryId")));

    EntryRecord {
        id: text(raw.get("id")),
        date: text(raw.get("date")),
        start: text(raw.get("start")),
        end: text(raw.get("end")),
        category,
        description: text(raw.get("description")).unwrap_or_default(),
        duration: number(raw.get("duration")),
        earned: number(raw.get("earned")),
        rate: number(raw.get("rate")),
        is_manual: raw.get("isManual").is_some_and(truthy),
        created_at: text(raw.get("createdAt")),
        updated_at: text(raw.get("updatedAt")),
    }
}

fn normalize_category(raw: &Map<String, Value>) -> Option<Category> {
    Some(Category {
        id: text(raw.get("id"))?,
        name: text(raw.get("name")).unwrap_or_default(),
        color: text(raw.get("color")),
        icon: text(raw.get("icon")),
        rate: raw.get("rate").filter(|v| !v.is_null()).map(|v| number(Some(v))),
    })
}

/// Strings pass through, numbers are rendered, everything else is absent.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Loose truthiness for flags written by older clients: `1`, `"yes"` count.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0 && !v.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Lenient float coercion: numbers as-is, strings by their leading numeric
/// prefix ("1.5h" -> 1.5), anything else (or non-finite) -> 0.
fn number(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_leading_float(s),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn parse_leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let candidate_len = s
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    (1..=candidate_len)
        .rev()
        .find_map(|len| s[..len].parse::<f64>().ok())
}

// ==========================================
// TESTS
// ==========================================
