//! Exiftool session management module
//!
//! Drives one long-running exiftool process in stay-open mode: requests are
//! written to its stdin one argument per line, and each response on stdout
//! ends with a `{ready}` token.
//!
//! # Architecture
//!
//! - **protocol**: command-line, request and shutdown line sequences
//! - **framing**: splits stdout into response frames at each ready token
//! - **ExifToolSession**: process lifecycle plus the serialized request channel
//! - **ExifToolConfig**: configuration with builder pattern and validation
//! - **Error Types**: protocol failures kept apart from decode failures
//!
//! # Usage
//!
//! ```no_run
//! use exif_session::exiftool::{ExifToolConfigBuilder, ExifToolSession};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExifToolConfigBuilder::new().add_common_arg("-n").build()?;
//! let session = ExifToolSession::start(config).await?;
//!
//! let compact = session.exif_compact("photo.jpg").await?;
//! println!("{:?}", compact.camera_model);
//!
//! session.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod session;
pub mod version;

#[cfg(test)]
pub mod testing;

pub use config::{ExifToolConfig, ExifToolConfigBuilder};
pub use error::{ExifToolConfigError, ExifToolError};
pub use session::ExifToolSession;
pub use version::ExifToolVersion;
