//! Configuration system for exiftool sessions
//!
//! Provides ExifToolConfig for session configuration with builder pattern
//! and validation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::exiftool::error::ExifToolConfigError;
use crate::exiftool::protocol::{self, EXIFTOOL_COMMAND};
use crate::io::process::DEFAULT_GRACE_PERIOD;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Environment variable naming the exiftool executable
pub const EXIFTOOL_PATH_ENV: &str = "EXIFTOOL_PATH";

/// Maximum allowed response timeout (1 hour)
///
/// Large video files can take minutes to scan; anything beyond an hour is
/// treated as a configuration mistake.
pub const MAX_RESPONSE_TIMEOUT_SECS: u64 = 3600;

// ============================================================================
// Core Configuration Types
// ============================================================================

/// Complete exiftool session configuration
#[derive(Clone)]
pub struct ExifToolConfig {
    /// Path to the exiftool executable
    pub exiftool_path: String,

    /// Flags appended after `-common_args`, applied to every request
    pub common_args: Vec<String>,

    /// Working directory for the exiftool process
    pub working_directory: Option<PathBuf>,

    /// Bound on the wait for one response; None waits indefinitely
    pub response_timeout: Option<Duration>,

    /// How long stop() waits for exiftool to exit before killing it
    pub shutdown_grace_period: Duration,

    /// Optional stderr handler for process monitoring
    pub stderr_handler: Option<Arc<dyn Fn(String) + Send + Sync>>,
}

impl std::fmt::Debug for ExifToolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExifToolConfig")
            .field("exiftool_path", &self.exiftool_path)
            .field("common_args", &self.common_args)
            .field("working_directory", &self.working_directory)
            .field("response_timeout", &self.response_timeout)
            .field("shutdown_grace_period", &self.shutdown_grace_period)
            .field(
                "stderr_handler",
                &self.stderr_handler.as_ref().map(|_| "Fn(String)"),
            )
            .finish()
    }
}

impl Default for ExifToolConfig {
    fn default() -> Self {
        Self {
            exiftool_path: EXIFTOOL_COMMAND.to_string(),
            common_args: Vec::new(),
            working_directory: None,
            response_timeout: None,
            shutdown_grace_period: DEFAULT_GRACE_PERIOD,
            stderr_handler: None,
        }
    }
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for ExifToolConfig with validation and defaults
#[derive(Default)]
pub struct ExifToolConfigBuilder {
    exiftool_path: Option<String>,
    common_args: Vec<String>,
    working_directory: Option<PathBuf>,
    response_timeout: Option<Duration>,
    shutdown_grace_period: Option<Duration>,
    stderr_handler: Option<Arc<dyn Fn(String) + Send + Sync>>,
}

impl ExifToolConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path to the exiftool executable
    pub fn exiftool_path(mut self, path: impl Into<String>) -> Self {
        self.exiftool_path = Some(path.into());
        self
    }

    /// Add a flag applied to every request
    pub fn add_common_arg(mut self, arg: impl Into<String>) -> Self {
        self.common_args.push(arg.into());
        self
    }

    /// Add multiple flags applied to every request
    pub fn add_common_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.common_args
            .extend(args.into_iter().map(|arg| arg.into()));
        self
    }

    /// Set the working directory for the exiftool process
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Bound the wait for each response
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Set how long stop() waits for a graceful exit
    pub fn shutdown_grace_period(mut self, grace_period: Duration) -> Self {
        self.shutdown_grace_period = Some(grace_period);
        self
    }

    /// Set the stderr handler for process monitoring
    pub fn stderr_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.stderr_handler = Some(Arc::new(handler));
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<ExifToolConfig, ExifToolConfigError> {
        let exiftool_path = self
            .exiftool_path
            .unwrap_or_else(|| EXIFTOOL_COMMAND.to_string());

        Self::validate_exiftool_path(&exiftool_path)?;
        Self::validate_arguments(&self.common_args)?;
        if let Some(working_directory) = &self.working_directory {
            Self::validate_working_directory(working_directory)?;
        }
        if let Some(timeout) = self.response_timeout {
            Self::validate_timeout(timeout)?;
        }

        Ok(ExifToolConfig {
            exiftool_path,
            common_args: self.common_args,
            working_directory: self.working_directory,
            response_timeout: self.response_timeout,
            shutdown_grace_period: self
                .shutdown_grace_period
                .unwrap_or(DEFAULT_GRACE_PERIOD),
            stderr_handler: self.stderr_handler,
        })
    }

    /// Validate exiftool executable path
    fn validate_exiftool_path(exiftool_path: &str) -> Result<(), ExifToolConfigError> {
        if exiftool_path.is_empty() {
            return Err(ExifToolConfigError::invalid_path(
                exiftool_path,
                "Exiftool path cannot be empty",
            ));
        }

        if exiftool_path.contains('\0') {
            return Err(ExifToolConfigError::invalid_path(
                exiftool_path,
                "Exiftool path contains null character",
            ));
        }

        // Existence is not checked here: the path may need PATH resolution,
        // and a missing binary surfaces as a spawn error at session start.
        Ok(())
    }

    /// Validate working directory exists and is a directory
    fn validate_working_directory(path: &Path) -> Result<(), ExifToolConfigError> {
        if !path.is_dir() {
            return Err(ExifToolConfigError::WorkingDirectoryValidation {
                working_dir: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Working directory does not exist or is not a directory",
                ),
            });
        }

        Ok(())
    }

    /// Validate the response timeout
    fn validate_timeout(timeout: Duration) -> Result<(), ExifToolConfigError> {
        if timeout.is_zero() {
            return Err(ExifToolConfigError::invalid_timeout(
                timeout,
                "Response timeout must be greater than zero",
            ));
        }

        if timeout > Duration::from_secs(MAX_RESPONSE_TIMEOUT_SECS) {
            return Err(ExifToolConfigError::invalid_timeout(
                timeout,
                "Response timeout too long (max 1 hour)",
            ));
        }

        Ok(())
    }

    /// Validate command-line arguments
    ///
    /// Common args end up on the command line, not stdin, but a line break in
    /// one would still be echoed into every request by exiftool.
    fn validate_arguments(args: &[String]) -> Result<(), ExifToolConfigError> {
        if args.iter().any(|arg| !protocol::is_valid_line(arg)) {
            return Err(ExifToolConfigError::invalid_arguments(
                args.to_vec(),
                "Arguments cannot contain line breaks or null characters",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Utility Methods
// ============================================================================

impl ExifToolConfig {
    /// Get the full command-line arguments for a stay-open exiftool
    pub fn get_exiftool_args(&self) -> Vec<String> {
        protocol::startup_args(&self.common_args)
    }

    /// Resolve the exiftool path: explicit value, then environment, then default
    pub fn resolve_exiftool_path(explicit: Option<String>) -> String {
        explicit
            .or_else(|| std::env::var(EXIFTOOL_PATH_ENV).ok())
            .unwrap_or_else(|| EXIFTOOL_COMMAND.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
