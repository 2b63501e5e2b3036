//! Flat record of commonly used metadata fields
//!
//! Fields that are missing or hold an unexpected type are left out.

use serde::Serialize;
use serde_json::Value;

use crate::document::access;
use crate::document::{ExifTimestamp, JsonObject};
use crate::metadata::exif_data::ExifData;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifCompact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length_in_35mm_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_aperture_value: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_compensation: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f_number: Option<f32>,
    #[serde(rename = "ISO", skip_serializing_if = "Option::is_none")]
    pub iso: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_space: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_resolution: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_resolution: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_width: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_height: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_date: Option<ExifTimestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modify_date: Option<ExifTimestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl ExifCompact {
    pub fn from_exif_data(data: &ExifData) -> Self {
        let string = |field: &str, group: &JsonObject| {
            access::get_string(field, group)
                .ok()
                .map(str::to_string)
        };

        Self {
            title: string("Title", &data.image),
            keywords: keywords(data.other.get("Keywords")),
            software: string("Software", &data.image),
            rating: access::get_uint("Rating", &data.image).ok(),

            camera_make: string("Make", &data.camera),
            camera_model: string("Model", &data.camera),
            lens_info: string("LensInfo", &data.image),
            lens_model: string("LensModel", &data.image),
            lens_make: string("LensMake", &data.image),
            focal_length: string("FocalLength", &data.camera),
            focal_length_in_35mm_format: string("FocalLengthIn35mmFormat", &data.camera),
            max_aperture_value: access::get_f32("MaxApertureValue", &data.camera).ok(),
            flash: string("Flash", &data.camera),

            exposure_time: string("ExposureTime", &data.image),
            exposure_compensation: access::get_f32("ExposureCompensation", &data.image).ok(),
            exposure_program: string("ExposureProgram", &data.camera),
            f_number: data.f_number().ok(),
            iso: data.iso().ok(),
            color_space: string("ColorSpace", &data.image),
            x_resolution: access::get_uint("XResolution", &data.image).ok(),
            y_resolution: access::get_uint("YResolution", &data.image).ok(),
            image_width: access::get_uint("ImageWidth", &data.image).ok(),
            image_height: access::get_uint("ImageHeight", &data.image).ok(),

            original_date: data.original_date().ok(),
            modify_date: data.modify_date().ok(),

            gps_latitude: access::get_f64("GPSLatitude", &data.location).ok(),
            gps_longitude: access::get_f64("GPSLongitude", &data.location).ok(),
            city: string("City", &data.location),
            country: string("Country", &data.location),
            state: string("State", &data.location),
        }
    }
}

/// Keywords arrive as a single string or as an array
fn keywords(value: Option<&Value>) -> Vec<String> {
    let text = |value: &Value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    match value {
        Some(Value::Array(items)) => items.iter().map(text).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![text(other)],
    }
}
