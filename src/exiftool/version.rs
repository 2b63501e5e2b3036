use std::fmt;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExifToolVersionError {
    #[error("Failed to execute exiftool: {0}")]
    ExecutionFailed(String),
    #[error("Failed to parse exiftool version output")]
    ParseFailed,
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExifToolVersion {
    pub major: u32,
    pub minor: u32,
}

impl ExifToolVersion {
    /// Detect exiftool version by running the -ver command
    pub fn detect(exiftool_path: &Path) -> Result<Self, ExifToolVersionError> {
        let output = Command::new(exiftool_path)
            .arg("-ver")
            .output()
            .map_err(|e| ExifToolVersionError::ExecutionFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(ExifToolVersionError::ExecutionFailed(
                "exiftool -ver failed".to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_version_output(&stdout)
    }

    fn parse_version_output(output: &str) -> Result<Self, ExifToolVersionError> {
        // Format examples:
        // "12.76"
        // "13.10\r\n"
        let version_str = output
            .split_whitespace()
            .next()
            .ok_or(ExifToolVersionError::ParseFailed)?;

        let (major_part, minor_part) = version_str
            .split_once('.')
            .ok_or_else(|| ExifToolVersionError::InvalidFormat(version_str.to_string()))?;

        let major = major_part
            .parse::<u32>()
            .map_err(|_| ExifToolVersionError::InvalidFormat("major version".to_string()))?;

        let minor = minor_part
            .parse::<u32>()
            .map_err(|_| ExifToolVersionError::InvalidFormat("minor version".to_string()))?;

        Ok(ExifToolVersion { major, minor })
    }
}

impl fmt::Display for ExifToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}
