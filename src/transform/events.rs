//! JSON event input and output.
//!
//! Supported inputs:
//! - A JSON array: `[[1700000000, {"a":1}], {"a":2}]`
//! - Newline-delimited JSON (NDJSON): `[1700000000, {"a":1}]\n{"a":2}\n`
//!
//! Each event is either a `[time, record]` pair or a bare record object, which gets the default
//! time supplied by the caller.

use std::fs;
use std::path::Path;

use crate::error::{TransformError, TransformResult};
use crate::types::{record_from_json_map, record_to_json, Record};

/// Parse events from a file; see [`events_from_ndjson`].
pub fn events_from_path(
    path: impl AsRef<Path>,
    default_time: i64,
) -> TransformResult<Vec<(i64, Record)>> {
    let text = fs::read_to_string(path)?;
    events_from_ndjson(&text, default_time)
}

/// Parse events from an in-memory JSON array or NDJSON string.
pub fn events_from_ndjson(input: &str, default_time: i64) -> TransformResult<Vec<(i64, Record)>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    // A single JSON value first; a lone pair `[t, {..}]` is also a valid array, so only treat the
    // input as a list when its items are all events.
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
        if !is_pair(&items) {
            return items
                .into_iter()
                .enumerate()
                .map(|(i, v)| event_from_json(i + 1, v, default_time))
                .collect();
        }
    }

    let mut events = Vec::new();
    for (i, line) in trimmed.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let v: serde_json::Value =
            serde_json::from_str(line).map_err(|e| TransformError::InvalidRecord {
                line: i + 1,
                message: e.to_string(),
            })?;
        events.push(event_from_json(i + 1, v, default_time)?);
    }
    Ok(events)
}

/// Parse bare records (no timestamps) from a JSON array or NDJSON string.
pub fn records_from_ndjson(input: &str) -> TransformResult<Vec<Record>> {
    Ok(events_from_ndjson(input, 0)?
        .into_iter()
        .map(|(_, record)| record)
        .collect())
}

/// Render events as NDJSON, one `[time, record]` pair per line.
pub fn events_to_ndjson(events: &[(i64, Record)]) -> TransformResult<String> {
    let mut out = String::new();
    for (time, record) in events {
        let line = serde_json::json!([time, record_to_json(record)]);
        out.push_str(&serde_json::to_string(&line)?);
        out.push('\n');
    }
    Ok(out)
}

fn is_pair(items: &[serde_json::Value]) -> bool {
    matches!(items, [t, serde_json::Value::Object(_)] if t.is_i64())
}

fn event_from_json(
    line: usize,
    v: serde_json::Value,
    default_time: i64,
) -> TransformResult<(i64, Record)> {
    match v {
        serde_json::Value::Object(obj) => Ok((default_time, record_from_json_map(obj))),
        serde_json::Value::Array(items) => match <[serde_json::Value; 2]>::try_from(items) {
            Ok([t, serde_json::Value::Object(obj)]) => {
                let time = t.as_i64().ok_or_else(|| TransformError::InvalidRecord {
                    line,
                    message: format!("event time must be an integer, got {t}"),
                })?;
                Ok((time, record_from_json_map(obj)))
            }
            _ => Err(TransformError::InvalidRecord {
                line,
                message: "expected [time, record]".to_string(),
            }),
        },
        other => Err(TransformError::InvalidRecord {
            line,
            message: format!("expected an object or [time, record], got {other}"),
        }),
    }
}
