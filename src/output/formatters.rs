//! Reusable formatting utilities for CLI output

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Format a UTC timestamp as local date/time with a zone abbreviation.
///
/// # Example output
/// `01/15/2025 14:30 PST`
pub fn format_timestamp_local(ts: DateTime<Utc>) -> String {
    let local = ts.with_timezone(&chrono::Local);
    let date_time = local.format("%m/%d/%Y %H:%M").to_string();
    format!(
        "{} {}",
        date_time,
        offset_to_tz_abbrev(local.offset().local_minus_utc())
    )
}

/// Convert UTC offset (seconds) to timezone abbreviation.
///
/// Falls back to `UTC+N` for offsets without a common abbreviation.
pub fn offset_to_tz_abbrev(offset_secs: i32) -> String {
    let offset_hours = offset_secs / 3600;
    let abbrev = match offset_hours {
        -10 => "HST",
        -9 => "AKST",
        -8 => "PST",
        -7 => "MST",
        -6 => "CST",
        -5 => "EST",
        0 => "UTC",
        1 => "CET",
        2 => "EET",
        3 => "MSK",
        4 => "GST",
        9 => "JST",
        10 => "AEST",
        _ => return format!("UTC{:+}", offset_hours),
    };
    abbrev.to_string()
}

/// Human-readable age or remaining time.
///
/// # Example output
/// - `2h 15m`
/// - `5m 10s`
/// - `45s`
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Render one JSON value as a table cell
pub fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a row as `key: value` lines, `id` first
pub fn format_record(row: &Value) -> String {
    let Some(obj) = row.as_object() else {
        return cell(row);
    };

    let mut lines = Vec::with_capacity(obj.len());
    if let Some(id) = obj.get("id") {
        lines.push(format!("id: {}", cell(id)));
    }
    for (key, value) in obj.iter().filter(|(k, _)| k.as_str() != "id") {
        lines.push(format!("{}: {}", key, cell(value)));
    }
    lines.join("\n")
}
