//! Category-grouped metadata
//!
//! With `-g2` exiftool nests every tag under a category object. A group that
//! is missing, or is not an object, is left empty.

use serde::Serialize;

use crate::document::access::{self, AccessError};
use crate::document::{ExifTimestamp, JsonObject};

pub const AUDIO: &str = "Audio";
pub const AUTHOR: &str = "Author";
pub const CAMERA: &str = "Camera";
pub const DEVICE: &str = "Device";
pub const DOCUMENT: &str = "Document";
pub const EXIFTOOL: &str = "ExifTool";
pub const IMAGE: &str = "Image";
pub const LOCATION: &str = "Location";
pub const OTHER: &str = "Other";
pub const PREVIEW: &str = "Preview";
pub const PRINTING: &str = "Printing";
pub const TIME: &str = "Time";
pub const UNKNOWN: &str = "Unknown";
pub const VIDEO: &str = "Video";

/// All category groups in document order
pub const GROUPS: [&str; 14] = [
    AUDIO, AUTHOR, CAMERA, DEVICE, DOCUMENT, EXIFTOOL, IMAGE, LOCATION, OTHER, PREVIEW, PRINTING,
    TIME, UNKNOWN, VIDEO,
];

/// One document split into its category groups
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExifData {
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub audio: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub author: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub camera: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub device: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub document: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub exiftool: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub image: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub location: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub other: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub preview: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub printing: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub time: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub unknown: JsonObject,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub video: JsonObject,
}

fn group(root: &JsonObject, name: &str) -> JsonObject {
    access::get_object(name, root).cloned().unwrap_or_default()
}

impl ExifData {
    /// Split a decoded document into its groups
    pub fn from_document(root: &JsonObject) -> Self {
        Self {
            audio: group(root, AUDIO),
            author: group(root, AUTHOR),
            camera: group(root, CAMERA),
            device: group(root, DEVICE),
            document: group(root, DOCUMENT),
            exiftool: group(root, EXIFTOOL),
            image: group(root, IMAGE),
            location: group(root, LOCATION),
            other: group(root, OTHER),
            preview: group(root, PREVIEW),
            printing: group(root, PRINTING),
            time: group(root, TIME),
            unknown: group(root, UNKNOWN),
            video: group(root, VIDEO),
        }
    }

    /// Look up a group by its exiftool category name
    pub fn group(&self, name: &str) -> Option<&JsonObject> {
        let group = match name {
            AUDIO => &self.audio,
            AUTHOR => &self.author,
            CAMERA => &self.camera,
            DEVICE => &self.device,
            DOCUMENT => &self.document,
            EXIFTOOL => &self.exiftool,
            IMAGE => &self.image,
            LOCATION => &self.location,
            OTHER => &self.other,
            PREVIEW => &self.preview,
            PRINTING => &self.printing,
            TIME => &self.time,
            UNKNOWN => &self.unknown,
            VIDEO => &self.video,
            _ => return None,
        };
        Some(group)
    }

    pub fn f_number(&self) -> Result<f32, AccessError> {
        access::get_f32("FNumber", &self.image)
    }

    pub fn iso(&self) -> Result<u64, AccessError> {
        access::get_uint("ISO", &self.image)
    }

    pub fn shutter_speed_value(&self) -> Result<&str, AccessError> {
        access::get_string("ShutterSpeedValue", &self.image)
    }

    /// Capture time, offset-qualified when `OffsetTimeOriginal` is present
    pub fn original_date(&self) -> Result<ExifTimestamp, AccessError> {
        access::get_datetime("DateTimeOriginal", "OffsetTimeOriginal", &self.time)
    }

    /// Last modification time, offset-qualified when `OffsetTime` is present
    pub fn modify_date(&self) -> Result<ExifTimestamp, AccessError> {
        access::get_datetime("ModifyDate", "OffsetTime", &self.time)
    }
}
