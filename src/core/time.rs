//! Shared timestamp/id helpers for record envelopes.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use ulid::Ulid;

/// Returns the current UTC instant as RFC 3339 with millisecond precision
/// and a `Z` suffix (e.g. `2026-10-16T09:12:44.031Z`).
pub fn now_rfc3339() -> String {
    format_rfc3339(Utc::now())
}

pub fn format_rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Standard command response envelope shape used across CLI surfaces.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "ts": now_rfc3339(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}

/// Truncates a record timestamp to its UTC calendar day.
///
/// Full RFC 3339 instants are normalized to UTC first. Anything else that
/// starts with a `YYYY-MM-DD` date is accepted as-is; otherwise `None`.
pub fn day_of(ts: &str) -> Option<NaiveDate> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
        return Some(parsed.with_timezone(&Utc).date_naive());
    }
    let head = ts.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}
