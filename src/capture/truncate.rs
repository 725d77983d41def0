//! Byte-budgeted truncation of structured payloads.
//!
//! Sizes are measured as compact JSON. For budgets of at least
//! [`MIN_GUARANTEED_BUDGET`] bytes the output of [`truncate`] always
//! serializes within the budget, however deeply the input nests.

use std::io;

use serde::Serialize;
use serde_json::{Map, Value};

/// Appended to strings that were cut.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Substituted for data that cannot be represented as JSON.
pub const UNSERIALIZABLE_PLACEHOLDER: &str = "[unserializable]";

/// Smallest budget for which the size bound holds.
pub const MIN_GUARANTEED_BUDGET: usize = 32;

const MAX_SEQUENCE_ITEMS: usize = 10;

/// Counts bytes written and fails once past `limit`.
struct CountingWriter {
    count: usize,
    limit: usize,
}

impl io::Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.count = self.count.saturating_add(buf.len());
        if self.count > self.limit {
            return Err(io::Error::other("size limit exceeded"));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Serialized size of `value` if it is at most `limit`, else `None`.
#[must_use]
pub fn measure(value: &Value, limit: usize) -> Option<usize> {
    let mut writer = CountingWriter { count: 0, limit };
    serde_json::to_writer(&mut writer, value).ok()?;
    Some(writer.count)
}

/// Serialized size of `value`.
#[must_use]
pub fn serialized_len(value: &Value) -> usize {
    measure(value, usize::MAX).unwrap_or(usize::MAX)
}

/// Bytes `c` occupies inside a JSON string literal.
const fn escaped_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\u{08}' | '\u{0c}' | '\n' | '\r' | '\t' => 2,
        c if (c as u32) < 0x20 => 6,
        c => c.len_utf8(),
    }
}

fn escaped_str_len(s: &str) -> usize {
    s.chars().map(escaped_len).sum::<usize>() + 2
}

/// Longest prefix of `s` whose escaped body fits in `budget` bytes.
fn prefix_within(s: &str, budget: usize) -> &str {
    let mut used = 0;
    for (idx, c) in s.char_indices() {
        let len = escaped_len(c);
        if used + len > budget {
            return &s[..idx];
        }
        used += len;
    }
    s
}

/// Bound the serialized size of `value` to `max_bytes`.
#[must_use]
pub fn truncate(value: &Value, max_bytes: usize) -> Value {
    if measure(value, max_bytes).is_some() {
        return value.clone();
    }
    match value {
        Value::String(s) => truncate_string(s, max_bytes),
        Value::Array(items) => truncate_array(items, max_bytes),
        Value::Object(map) => truncate_object(map, max_bytes),
        other => other.clone(),
    }
}

fn truncate_string(s: &str, max_bytes: usize) -> Value {
    let overhead = 2 + TRUNCATION_MARKER.len();
    if max_bytes >= overhead {
        let budget = (max_bytes / 2).min(max_bytes - overhead);
        let prefix = prefix_within(s, budget);
        Value::String(format!("{prefix}{TRUNCATION_MARKER}"))
    } else {
        let prefix = prefix_within(s, max_bytes.saturating_sub(2));
        Value::String(prefix.to_string())
    }
}

fn truncate_array(items: &[Value], max_bytes: usize) -> Value {
    let per_item = max_bytes.saturating_sub(2 + MAX_SEQUENCE_ITEMS - 1) / MAX_SEQUENCE_ITEMS;
    let mut out = Vec::new();
    let mut used = 2;

    for item in items.iter().take(MAX_SEQUENCE_ITEMS) {
        let bounded = truncate(item, per_item);
        let separator = usize::from(!out.is_empty());
        let Some(size) = measure(&bounded, max_bytes.saturating_sub(used + separator)) else {
            break;
        };
        used += separator + size;
        out.push(bounded);
    }
    Value::Array(out)
}

fn truncate_object(map: &Map<String, Value>, max_bytes: usize) -> Value {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = Map::new();
    let mut used = 2;

    for (key, value) in entries {
        let remaining = max_bytes.saturating_sub(used);
        let bounded = truncate(value, remaining / 4);
        let separator = usize::from(!out.is_empty());
        let key_len = escaped_str_len(key) + 1;
        let Some(size) = measure(&bounded, remaining.saturating_sub(separator + key_len)) else {
            break;
        };
        if used + separator + key_len + size > max_bytes {
            break;
        }
        used += separator + key_len + size;
        out.insert(key.clone(), bounded);
    }
    Value::Object(out)
}

/// Convert `data` to JSON and bound it, substituting a placeholder when the
/// data has no JSON form.
#[must_use]
pub fn prepare<T: Serialize + ?Sized>(data: &T, max_bytes: usize) -> Value {
    match serde_json::to_value(data) {
        Ok(value) => truncate(&value, max_bytes),
        Err(err) => {
            tracing::debug!(error = %err, "payload not serializable");
            Value::String(UNSERIALIZABLE_PLACEHOLDER.to_string())
        }
    }
}
