//! Typed field access on untyped JSON documents
//!
//! Every getter distinguishes a missing field from a field holding the wrong
//! kind of value, so callers can decide which of the two they tolerate.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;

use crate::document::{JsonArray, JsonObject};

/// exiftool's date-time layout
pub const EXIF_DATE_TIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// exiftool's date-time layout followed by a `±HH:MM` offset
pub const EXIF_DATE_TIME_OFFSET_FORMAT: &str = "%Y:%m:%d %H:%M:%S %:z";

/// Kind of a JSON value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonType {
    String,
    Number,
    Bool,
    Array,
    Object,
    Null,
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Bool => "bool",
            JsonType::Array => "array",
            JsonType::Object => "object",
            JsonType::Null => "null",
        };
        f.write_str(name)
    }
}

/// Get the kind of a JSON value
pub fn type_of(value: &Value) -> JsonType {
    match value {
        Value::String(_) => JsonType::String,
        Value::Number(_) => JsonType::Number,
        Value::Bool(_) => JsonType::Bool,
        Value::Array(_) => JsonType::Array,
        Value::Object(_) => JsonType::Object,
        Value::Null => JsonType::Null,
    }
}

/// Check whether a JSON value is of the given kind
pub fn is_type(value: &Value, json_type: JsonType) -> bool {
    type_of(value) == json_type
}

/// Field access errors
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Value not found: {field}")]
    NotFound { field: String },

    #[error("Incorrect type for {field}: expected {expected}, found {found}")]
    WrongType {
        field: String,
        expected: JsonType,
        found: JsonType,
    },

    #[error("Invalid date-time {value:?}: {source}")]
    InvalidDateTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl AccessError {
    fn wrong_type(field: &str, expected: JsonType, found: &Value) -> Self {
        Self::WrongType {
            field: field.to_string(),
            expected,
            found: type_of(found),
        }
    }

    /// Check whether the field was simply absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn lookup<'a>(field: &str, obj: &'a JsonObject) -> Result<&'a Value, AccessError> {
    obj.get(field).ok_or_else(|| AccessError::NotFound {
        field: field.to_string(),
    })
}

/// Get a string field
pub fn get_string<'a>(field: &str, obj: &'a JsonObject) -> Result<&'a str, AccessError> {
    match lookup(field, obj)? {
        Value::String(s) => Ok(s),
        other => Err(AccessError::wrong_type(field, JsonType::String, other)),
    }
}

/// Get a numeric field as f64
pub fn get_number(field: &str, obj: &JsonObject) -> Result<f64, AccessError> {
    let value = lookup(field, obj)?;
    value
        .as_f64()
        .ok_or_else(|| AccessError::wrong_type(field, JsonType::Number, value))
}

/// Get a numeric field as f64
pub fn get_f64(field: &str, obj: &JsonObject) -> Result<f64, AccessError> {
    get_number(field, obj)
}

/// Get a numeric field as f32
pub fn get_f32(field: &str, obj: &JsonObject) -> Result<f32, AccessError> {
    get_number(field, obj).map(|n| n as f32)
}

/// Get a numeric field as a signed integer, truncating any fraction
pub fn get_int(field: &str, obj: &JsonObject) -> Result<i64, AccessError> {
    get_number(field, obj).map(|n| n as i64)
}

/// Get a numeric field as an unsigned integer, truncating any fraction
///
/// Negative numbers are reported as the wrong type.
pub fn get_uint(field: &str, obj: &JsonObject) -> Result<u64, AccessError> {
    let n = get_number(field, obj)?;
    if n < 0.0 {
        return Err(AccessError::WrongType {
            field: field.to_string(),
            expected: JsonType::Number,
            found: JsonType::Number,
        });
    }
    Ok(n as u64)
}

/// Get a boolean field
pub fn get_bool(field: &str, obj: &JsonObject) -> Result<bool, AccessError> {
    match lookup(field, obj)? {
        Value::Bool(b) => Ok(*b),
        other => Err(AccessError::wrong_type(field, JsonType::Bool, other)),
    }
}

/// Get an array field
pub fn get_array<'a>(field: &str, obj: &'a JsonObject) -> Result<&'a JsonArray, AccessError> {
    match lookup(field, obj)? {
        Value::Array(array) => Ok(array),
        other => Err(AccessError::wrong_type(field, JsonType::Array, other)),
    }
}

/// Get a nested object field
pub fn get_object<'a>(field: &str, obj: &'a JsonObject) -> Result<&'a JsonObject, AccessError> {
    match lookup(field, obj)? {
        Value::Object(object) => Ok(object),
        other => Err(AccessError::wrong_type(field, JsonType::Object, other)),
    }
}

/// Timestamp read from a document
///
/// exiftool keeps the UTC offset of a timestamp in a separate tag, so a
/// timestamp is only offset-qualified when that tag is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExifTimestamp {
    /// Wall-clock time with no known offset
    Local(NaiveDateTime),
    /// Time with a known UTC offset
    Offset(DateTime<FixedOffset>),
}

impl ExifTimestamp {
    /// Wall-clock date and time, ignoring any offset
    pub fn naive_local(&self) -> NaiveDateTime {
        match self {
            ExifTimestamp::Local(dt) => *dt,
            ExifTimestamp::Offset(dt) => dt.naive_local(),
        }
    }

    /// The UTC offset, if known
    pub fn offset(&self) -> Option<FixedOffset> {
        match self {
            ExifTimestamp::Local(_) => None,
            ExifTimestamp::Offset(dt) => Some(*dt.offset()),
        }
    }

    /// Format back into exiftool's layout
    pub fn to_exif_string(&self) -> String {
        match self {
            ExifTimestamp::Local(dt) => dt.format(EXIF_DATE_TIME_FORMAT).to_string(),
            ExifTimestamp::Offset(dt) => dt.format(EXIF_DATE_TIME_OFFSET_FORMAT).to_string(),
        }
    }
}

/// Parse an exiftool timestamp with an optional `±HH:MM` offset
///
/// An empty offset yields a local timestamp.
pub fn parse_datetime(dt: &str, offset: &str) -> Result<ExifTimestamp, AccessError> {
    if offset.is_empty() {
        NaiveDateTime::parse_from_str(dt, EXIF_DATE_TIME_FORMAT)
            .map(ExifTimestamp::Local)
            .map_err(|source| AccessError::InvalidDateTime {
                value: dt.to_string(),
                source,
            })
    } else {
        let value = format!("{dt} {offset}");
        DateTime::parse_from_str(&value, EXIF_DATE_TIME_OFFSET_FORMAT)
            .map(ExifTimestamp::Offset)
            .map_err(|source| AccessError::InvalidDateTime { value, source })
    }
}

/// Get a timestamp from `dt_field`, qualified by `offset_field` when present
///
/// A missing or non-string offset field is treated as absent.
pub fn get_datetime(
    dt_field: &str,
    offset_field: &str,
    obj: &JsonObject,
) -> Result<ExifTimestamp, AccessError> {
    let dt = get_string(dt_field, obj)?;
    let offset = get_string(offset_field, obj).unwrap_or("");
    parse_datetime(dt, offset)
}
