//! Filter to query-string encoding.
//!
//! Filters are arbitrary JSON objects. Nested objects and arrays use the
//! bracket notation most REST frameworks understand:
//! `{"a": {"b": 1}, "tags": ["x", "y"]}` becomes `a[b]=1&tags[0]=x&tags[1]=y`.

use reqwest::Url;
use serde_json::Value;

use crate::error::TransportError;

/// Flatten a filter into ordered `(name, value)` pairs.
///
/// Only objects produce pairs; any other top-level value yields none.
/// `null` leaves encode as an empty value, empty arrays and objects are
/// dropped.
pub fn encode_filter(filter: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Value::Object(map) = filter {
        for (name, value) in map {
            push_pairs(name.clone(), value, &mut pairs);
        }
    }
    pairs
}

fn push_pairs(prefix: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Null => pairs.push((prefix, String::new())),
        Value::Bool(b) => pairs.push((prefix, b.to_string())),
        Value::Number(n) => pairs.push((prefix, n.to_string())),
        Value::String(s) => pairs.push((prefix, s.clone())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                push_pairs(format!("{prefix}[{index}]"), item, pairs);
            }
        }
        Value::Object(map) => {
            for (name, item) in map {
                push_pairs(format!("{prefix}[{name}]"), item, pairs);
            }
        }
    }
}

/// Build a request URL from a base and an optional filter.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] if `base` is not an absolute URL.
pub fn build_url(base: &str, filter: Option<&Value>) -> Result<String, TransportError> {
    let mut url = Url::parse(base).map_err(|e| TransportError::InvalidUrl(format!("{base}: {e}")))?;
    let pairs = filter.map(encode_filter).unwrap_or_default();
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    Ok(url.into())
}

/// Append one path segment to `base`, percent-encoding it.
///
/// Characters such as `/`, `?` or `#` in `segment` stay inside the segment.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] if `base` is not an absolute
/// hierarchical URL.
pub(crate) fn push_segment(base: &str, segment: &str) -> Result<String, TransportError> {
    let mut url = Url::parse(base).map_err(|e| TransportError::InvalidUrl(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| TransportError::InvalidUrl(format!("{base}: cannot have path segments")))?
        .pop_if_empty()
        .push(segment);
    Ok(url.into())
}
