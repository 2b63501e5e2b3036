//! Generic JSON documents produced by exiftool
//!
//! - **decoder**: turns one response frame into JSON documents
//! - **access**: typed field access on an untyped document

pub mod access;
pub mod decoder;

pub use access::{AccessError, ExifTimestamp, JsonType};
pub use decoder::{decode_documents, decode_single};

/// An untyped JSON object
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// An untyped JSON array
pub type JsonArray = Vec<serde_json::Value>;

/// Errors decoding a response frame into documents
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a JSON array of documents, got {found}")]
    NotAnArray { found: JsonType },

    #[error("Expected a JSON object document, got {found}")]
    NotAnObject { found: JsonType },

    #[error("no data")]
    NoData,
}
