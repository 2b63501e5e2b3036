use serde_json::Value;

use crate::document::access::type_of;
use crate::document::{DocumentError, JsonObject};

/// Decode a response frame into its list of documents
///
/// exiftool's `-j` output is always a JSON array with one object per file.
/// Elements that are not objects are rejected.
pub fn decode_documents(frame: &[u8]) -> Result<Vec<JsonObject>, DocumentError> {
    let value: Value = serde_json::from_slice(frame)?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(DocumentError::NotAnArray {
                found: type_of(&other),
            });
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(object) => Ok(object),
            other => Err(DocumentError::NotAnObject {
                found: type_of(&other),
            }),
        })
        .collect()
}

/// Decode a response frame for a single target into its document
///
/// An empty array means exiftool produced nothing for the target and is
/// reported as [`DocumentError::NoData`].
pub fn decode_single(frame: &[u8]) -> Result<JsonObject, DocumentError> {
    decode_documents(frame)?
        .into_iter()
        .next()
        .ok_or(DocumentError::NoData)
}
