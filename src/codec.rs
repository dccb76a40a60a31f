//! Property codec
//!
//! Bodies are stored as canonical JSON: keys sorted, no insignificant whitespace.
//! Structural document equality is defined over these bytes.

use crate::error::{DbError, StorageError};
use crate::types::BlobDigest;
use crate::value::{Properties, Value};
use std::collections::BTreeSet;

/// Serialize properties to a revision body.
///
/// JSON has no representation for NaN or infinities, so non-finite floats are rejected
/// rather than stored as `null`.
pub fn encode_properties(properties: &Properties) -> Result<Vec<u8>, DbError> {
    for (key, value) in properties.iter() {
        if !is_finite(value) {
            return Err(DbError::WrongFormat(format!(
                "property {:?} holds a non-finite number",
                key
            )));
        }
    }
    serde_json::to_vec(properties)
        .map_err(|e| DbError::WrongFormat(format!("Failed to encode properties: {}", e)))
}

fn is_finite(value: &Value) -> bool {
    match value {
        Value::Float(f) => f.is_finite(),
        Value::Array(items) => items.iter().all(is_finite),
        Value::Map(map) => map.iter().all(|(_, v)| is_finite(v)),
        _ => true,
    }
}

/// Parse a revision body back into properties.
pub fn decode_properties(body: &[u8]) -> Result<Properties, StorageError> {
    if body.is_empty() {
        return Ok(Properties::new());
    }
    serde_json::from_slice(body)
        .map_err(|e| StorageError::Corrupt(format!("Failed to decode revision body: {}", e)))
}

/// Collect the digests of every blob referenced anywhere in the properties.
pub fn blob_references(properties: &Properties) -> BTreeSet<BlobDigest> {
    let mut out = BTreeSet::new();
    for (_, value) in properties.iter() {
        collect_blobs(value, &mut out);
    }
    out
}

fn collect_blobs(value: &Value, out: &mut BTreeSet<BlobDigest>) {
    match value {
        Value::Blob(blob) => {
            out.insert(blob.digest.clone());
        }
        Value::Array(items) => items.iter().for_each(|v| collect_blobs(v, out)),
        Value::Map(map) => map.iter().for_each(|(_, v)| collect_blobs(v, out)),
        _ => {}
    }
}

/// Value of the top-level `"type"` property, recorded by the engine as the document type.
pub fn doc_type_of(properties: &Properties) -> Option<String> {
    properties
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
}
