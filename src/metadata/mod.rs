//! Application records built from exiftool documents
//!
//! - **exif_data**: a document split into its `-g2` category groups
//! - **compact**: a flat record of commonly used fields

pub mod compact;
pub mod exif_data;

pub use compact::ExifCompact;
pub use exif_data::ExifData;
