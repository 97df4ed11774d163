//! Metadata document reconciliation.

use serde_json::{Map, Value};

use crate::error::MergeError;

/// Merge a stored metadata document with a freshly resolved one.
///
/// An empty side passes the other through verbatim. Otherwise both sides
/// must parse as JSON objects; keys present in `resolved` but absent from
/// `stored` fill the gaps, and keys already present in `stored` are never
/// overwritten. Previously resolved data stays authoritative across
/// attempts.
pub fn merge(stored: &[u8], resolved: &[u8]) -> Result<Vec<u8>, MergeError> {
    if stored.is_empty() {
        return Ok(resolved.to_vec());
    }
    if resolved.is_empty() {
        return Ok(stored.to_vec());
    }

    let mut base: Map<String, Value> =
        serde_json::from_slice(stored).map_err(MergeError::Stored)?;
    let incoming: Map<String, Value> =
        serde_json::from_slice(resolved).map_err(MergeError::Resolved)?;

    for (key, value) in incoming {
        base.entry(key).or_insert(value);
    }

    serde_json::to_vec(&base).map_err(MergeError::Serialize)
}
