//! Error types for exiftool session management
//!
//! Separates protocol failures (the session is unusable) from data failures
//! (one response could not be decoded, the session is fine).

use std::time::Duration;

use crate::document::DocumentError;
use crate::io::process::ProcessError;

// ============================================================================
// Exiftool Session Errors
// ============================================================================

/// Error types for exiftool session operations
#[derive(Debug, thiserror::Error)]
pub enum ExifToolError {
    /// Process management errors (spawn, pipes)
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(#[from] ExifToolConfigError),

    /// Session startup failed
    #[error("Session startup failed: {reason}")]
    StartupFailed { reason: String },

    /// Request attempted after stop() or a failed start()
    #[error("Session is closed")]
    SessionClosed,

    /// stop() called on a session that is already closed
    #[error("Session already closed")]
    AlreadyClosed,

    /// A flag or target cannot be sent as a single protocol line
    #[error("Invalid request argument {argument:?}: {reason}")]
    InvalidRequest { argument: String, reason: String },

    /// Writing the command sequence failed
    #[error("Failed to send request: {reason}")]
    Transport { reason: String },

    /// Output stream ended or failed before a full frame arrived
    #[error("No response from exiftool: {reason}")]
    NoResponse { reason: String },

    /// No frame arrived within the configured response timeout
    #[error("No response from exiftool within {timeout:?}")]
    ResponseTimeout { timeout: Duration },

    /// An earlier request lost its response, so responses can no longer be matched to requests
    #[error("Session is poisoned by an earlier failed request; stop and restart it")]
    SessionPoisoned,

    /// The response frame could not be decoded
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// One or more shutdown steps failed; all steps were still attempted
    #[error("Session shutdown failed: {}", .errors.join("; "))]
    ShutdownFailed { errors: Vec<String> },
}

// ============================================================================
// Exiftool Configuration Errors
// ============================================================================

/// Configuration validation and building errors
#[derive(Debug, thiserror::Error)]
pub enum ExifToolConfigError {
    /// Invalid path format or value
    #[error("Invalid path: {path} - {reason}")]
    InvalidPath { path: String, reason: String },

    /// Invalid timeout value
    #[error("Invalid timeout: {timeout:?} - {reason}")]
    InvalidTimeout { timeout: Duration, reason: String },

    /// Invalid exiftool arguments
    #[error("Invalid exiftool arguments: {args:?} - {reason}")]
    InvalidArguments { args: Vec<String>, reason: String },

    /// Working directory validation error
    #[error("Working directory validation failed: {working_dir}")]
    WorkingDirectoryValidation {
        working_dir: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Error Conversion and Context Helpers
// ============================================================================

impl ExifToolError {
    /// Create a startup failure error with context
    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    /// Create a send failure error
    pub fn transport(reason: impl ToString) -> Self {
        Self::Transport {
            reason: reason.to_string(),
        }
    }

    /// Create a frame-unavailable error
    pub fn no_response(reason: impl Into<String>) -> Self {
        Self::NoResponse {
            reason: reason.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Whether the session can no longer serve requests after this error
    ///
    /// Decode and argument errors leave the session usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Document(_) | Self::InvalidRequest { .. } | Self::Config(_)
        )
    }
}

impl ExifToolConfigError {
    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid timeout error
    pub fn invalid_timeout(timeout: Duration, reason: impl Into<String>) -> Self {
        Self::InvalidTimeout {
            timeout,
            reason: reason.into(),
        }
    }

    /// Create an invalid arguments error
    pub fn invalid_arguments(args: Vec<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            args,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
