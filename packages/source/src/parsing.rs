//! Shared parsing utilities for active call payloads.
//!
//! Dispatch timestamps arrive either as RFC 3339 strings or as naive ISO
//! timestamps in the agency's local time; record lists arrive either as a
//! bare array or wrapped in an object.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::SourceError;

/// Naive formats tried after RFC 3339, most specific first.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parses an upstream dispatch timestamp.
///
/// Strings with an explicit offset (`Z`, `+00:00`, ...) keep it. Naive
/// strings are interpreted in `tz`; a local time skipped by a DST
/// transition yields `None`, an ambiguous one resolves to the earlier
/// instant.
#[must_use]
pub fn parse_response_date(s: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }

    NAIVE_FORMATS.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(s, fmt).ok()?;
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.fixed_offset())
    })
}

/// Navigates a dot-separated path into a [`serde_json::Value`].
fn resolve_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Extracts the record array from a response body.
///
/// Accepts a bare array, or an object holding the array at
/// `records_path` (default `"data"`).
///
/// # Errors
///
/// Returns [`SourceError::Parse`] for any other shape, so a degraded
/// upstream is never mistaken for "no active calls".
pub fn extract_records(
    body: serde_json::Value,
    records_path: Option<&str>,
) -> Result<Vec<serde_json::Value>, SourceError> {
    match body {
        serde_json::Value::Array(records) => Ok(records),
        serde_json::Value::Object(map) => {
            let path = records_path.unwrap_or("data");
            let wrapper = serde_json::Value::Object(map);
            resolve_path(&wrapper, path)
                .and_then(serde_json::Value::as_array)
                .cloned()
                .ok_or_else(|| SourceError::Parse {
                    message: format!("response object has no record array at '{path}'"),
                })
        }
        other => Err(SourceError::Parse {
            message: format!("expected JSON array of records, got {}", kind_of(&other)),
        }),
    }
}

const fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
