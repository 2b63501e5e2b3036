//! Metadata extraction through a long-running exiftool process
//!
//! - **exiftool**: stay-open session, wire protocol and response framing
//! - **io**: process management and pipe transport
//! - **document**: decoding response frames and typed field access
//! - **metadata**: grouped and compact metadata records

pub mod document;
pub mod exiftool;
pub mod io;
pub mod logging;
pub mod metadata;

#[cfg(test)]
mod test_utils;
