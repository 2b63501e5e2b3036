//! Test utilities and global setup
//!
//! Provides centralized test logging configuration and other test helpers.

/// Test logging utilities
#[cfg(all(test, feature = "test-logging"))]
pub mod logging {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: Once = Once::new();

    /// Initialize test logging globally - safe to call multiple times
    ///
    /// Respects RUST_LOG and writes through the test writer so output is
    /// captured per test.
    ///
    /// ```bash
    /// RUST_LOG=trace cargo test --features test-logging
    /// RUST_LOG=exif_session::exiftool=trace cargo test --features test-logging
    /// ```
    pub fn init() {
        INIT.call_once(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("debug,tokio=info"));

            fmt()
                .with_env_filter(env_filter)
                .with_test_writer() // Ensures logs don't interfere with test output
                .with_target(true) // Include module paths in logs
                .with_thread_ids(true) // Include thread IDs for async debugging
                .compact()
                .try_init()
                .ok(); // Ignore errors if already initialized by another test
        });
    }
}

/// Get exiftool path for integration tests
///
/// Checks the EXIFTOOL_PATH environment variable and falls back to
/// "exiftool" if not set.
#[cfg(all(test, feature = "exiftool-integration-tests"))]
pub fn get_test_exiftool_path() -> String {
    std::env::var(crate::exiftool::config::EXIFTOOL_PATH_ENV)
        .unwrap_or_else(|_| crate::exiftool::protocol::EXIFTOOL_COMMAND.to_string())
}
