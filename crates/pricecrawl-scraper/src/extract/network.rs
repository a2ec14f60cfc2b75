//! Product records from captured API responses.

use serde_json::Value;

use crate::browser::CapturedResponse;
use crate::record::{RawRecord, RecordSource};

/// JSON paths probed in order; the first that holds an array wins.
const ENVELOPES: &[&[&str]] = &[
    &["products"],
    &["data", "products"],
    &["results"],
    &["data", "content"],
    &["content"],
    &["data", "results"],
    &["hits"],
    &["items"],
    &["data", "items"],
];

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Vec<Value>> {
    path.iter()
        .try_fold(root, |node, key| node.get(*key))
        .and_then(Value::as_array)
}

/// Object elements of the first matching envelope in `body`.
#[must_use]
pub fn records_from_body(body: &Value) -> Vec<RawRecord> {
    ENVELOPES
        .iter()
        .find_map(|path| lookup(body, path))
        .map(|items| {
            items
                .iter()
                .filter_map(|item| RawRecord::from_value(RecordSource::Network, item.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Records from every successful JSON capture. Unrecognized shapes yield nothing.
#[must_use]
pub fn extract(captures: &[CapturedResponse]) -> Vec<RawRecord> {
    let mut records = Vec::new();
    for capture in captures.iter().filter(|c| c.status == 200 && c.is_json()) {
        match serde_json::from_str::<Value>(&capture.body) {
            Ok(body) => {
                let found = records_from_body(&body);
                tracing::debug!(url = %capture.url, records = found.len(), "network capture");
                records.extend(found);
            }
            Err(e) => tracing::debug!(url = %capture.url, error = %e, "capture body is not JSON"),
        }
    }
    records
}
