//! Exiftool session management
//!
//! One session owns one stay-open exiftool process and its pipe pair. The
//! request lock spans the whole write-then-read cycle: the wire protocol has
//! no request ids, so ordering is the only thing pairing a response with its
//! request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{Level, debug, info, warn};

use crate::document::{self, DocumentError, JsonObject};
use crate::exiftool::config::ExifToolConfig;
use crate::exiftool::error::ExifToolError;
use crate::exiftool::protocol;
use crate::io::{
    ChildProcessManager, ProcessKiller, ProcessManager, StderrMonitor, StdioTransport, StopMode,
    Transport,
};
use crate::metadata::{ExifCompact, ExifData};

/// State guarded by the request lock
struct SessionInner<T> {
    /// Pipe pair to the process
    transport: T,

    /// Set while a request is in flight and left set if it never got its frame
    poisoned: bool,

    /// Owned process, absent for sessions over a caller-supplied transport
    process: Option<ChildProcessManager>,
}

/// A stay-open exiftool session
///
/// Methods take `&self`, so one session can be shared between tasks behind
/// an `Arc`; concurrent requests are served one at a time.
pub struct ExifToolSession<T: Transport = StdioTransport> {
    /// Session configuration
    config: ExifToolConfig,

    /// Request lock and the state it guards
    inner: Mutex<SessionInner<T>>,

    /// Set once by stop(); checked under the request lock
    closed: AtomicBool,

    /// Kills the process without taking the request lock
    killer: Option<ProcessKiller>,

    /// Session start timestamp
    started_at: Instant,
}

impl ExifToolSession<StdioTransport> {
    /// Start exiftool in stay-open mode
    ///
    /// If this method succeeds, the session is ready for requests.
    pub async fn start(config: ExifToolConfig) -> Result<Self, ExifToolError> {
        info!("Starting exiftool session");
        debug!("Exiftool path: {}", config.exiftool_path);
        debug!("Common args: {:?}", config.common_args);

        let mut process = ChildProcessManager::new(
            config.exiftool_path.clone(),
            config.get_exiftool_args(),
            config.working_directory.clone(),
        )
        .with_grace_period(config.shutdown_grace_period);

        // Install stderr handler before starting process
        if let Some(handler) = &config.stderr_handler {
            let handler = Arc::clone(handler);
            process.on_stderr_line(move |line| handler(line));
        }

        process.start().await?;

        let transport = match process.create_stdio_transport() {
            Ok(transport) => transport,
            Err(e) => {
                process.kill_sync();
                return Err(ExifToolError::startup_failed(format!(
                    "pipes unavailable after spawn: {e}"
                )));
            }
        };

        let killer = process.killer();
        info!("Exiftool session started successfully");
        Ok(Self::assemble(config, transport, Some(process), Some(killer)))
    }
}

impl<T: Transport> ExifToolSession<T> {
    /// Create a session over an already connected transport
    ///
    /// The session does not own a process; stop() closes the transport only.
    pub fn with_transport(transport: T, config: ExifToolConfig) -> Self {
        Self::assemble(config, transport, None, None)
    }

    fn assemble(
        config: ExifToolConfig,
        transport: T,
        process: Option<ChildProcessManager>,
        killer: Option<ProcessKiller>,
    ) -> Self {
        Self {
            config,
            inner: Mutex::new(SessionInner {
                transport,
                poisoned: false,
                process,
            }),
            closed: AtomicBool::new(false),
            killer,
            started_at: Instant::now(),
        }
    }

    /// Run one request and return its raw response frame
    ///
    /// Writes `flags`, `-j`, `-g2`, `target` and `-execute` as separate lines,
    /// then waits for the next frame. Callers queue behind any request
    /// already in flight.
    pub async fn execute<S: AsRef<str>>(
        &self,
        flags: &[S],
        target: &str,
    ) -> Result<Bytes, ExifToolError> {
        let mut inner = self.inner.lock().await;

        if self.is_closed() {
            return Err(ExifToolError::SessionClosed);
        }
        if inner.poisoned {
            return Err(ExifToolError::SessionPoisoned);
        }

        let lines = protocol::request_lines(flags, target);
        if let Some(line) = lines.iter().find(|line| !protocol::is_valid_line(line)) {
            return Err(ExifToolError::invalid_request(
                line.as_str(),
                "line breaks and null characters cannot be sent to exiftool",
            ));
        }

        debug!("Exiftool request: {:?}", lines);
        let started = Instant::now();

        // Stays set if this future is dropped mid-cycle: a half-written
        // request or an unread frame would otherwise reach the next caller.
        inner.poisoned = true;
        let result = self.round_trip(&mut inner.transport, &lines).await;

        match &result {
            Ok(frame) => {
                inner.poisoned = false;
                crate::log_timing!(Level::DEBUG, "exiftool request", started.elapsed());
                debug!("Exiftool response: {} bytes", frame.len());
            }
            Err(e) => warn!("Exiftool request for {} failed: {}", target, e),
        }

        result
    }

    /// Write one request and wait for its frame
    async fn round_trip(&self, transport: &mut T, lines: &[String]) -> Result<Bytes, ExifToolError> {
        for line in lines {
            transport
                .write_line(line)
                .await
                .map_err(ExifToolError::transport)?;
        }
        transport.flush().await.map_err(ExifToolError::transport)?;

        let outcome = match self.config.response_timeout {
            Some(timeout) => tokio::time::timeout(timeout, transport.read_frame())
                .await
                .map_err(|_| timeout),
            None => Ok(transport.read_frame().await),
        };

        match outcome {
            Ok(Ok(Some(frame))) => Ok(frame),
            Ok(Ok(None)) => Err(ExifToolError::no_response("output stream ended")),
            Ok(Err(e)) => Err(ExifToolError::no_response(e.to_string())),
            Err(timeout) => Err(ExifToolError::ResponseTimeout { timeout }),
        }
    }

    /// Read all metadata for `target`
    pub async fn read(&self, target: &str) -> Result<JsonObject, ExifToolError> {
        self.read_with_flags::<&str>(&[], target).await
    }

    /// Read metadata for `target` with extra per-request flags
    pub async fn read_with_flags<S: AsRef<str>>(
        &self,
        flags: &[S],
        target: &str,
    ) -> Result<JsonObject, ExifToolError> {
        let frame = self.execute(flags, target).await?;
        Ok(document::decode_single(&frame)?)
    }

    /// Read metadata for `target` into a deserializable type
    pub async fn unmarshal<D: DeserializeOwned>(&self, target: &str) -> Result<D, ExifToolError> {
        let object = self.read(target).await?;
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| ExifToolError::Document(DocumentError::Json(e)))
    }

    /// Read metadata for `target` split into category groups
    pub async fn exif_data(&self, target: &str) -> Result<ExifData, ExifToolError> {
        let object = self.read(target).await?;
        Ok(ExifData::from_document(&object))
    }

    /// Read the compact record for `target`
    pub async fn exif_compact(&self, target: &str) -> Result<ExifCompact, ExifToolError> {
        let data = self.exif_data(target).await?;
        Ok(ExifCompact::from_exif_data(&data))
    }

    /// Shut the session down
    ///
    /// Sends the exit sequence, closes both pipes and stops the process.
    /// Every step is attempted; failures are reported together. The session
    /// is closed afterwards whatever the outcome. Waits for any request in
    /// flight; use [`abort`](Self::abort) first to cut a hung request short.
    pub async fn stop(&self) -> Result<(), ExifToolError> {
        let mut inner = self.inner.lock().await;

        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ExifToolError::AlreadyClosed);
        }

        info!("Stopping exiftool session");
        let mut errors = Vec::new();

        if let Err(e) = Self::send_exit_sequence(&mut inner.transport).await {
            errors.push(format!("error sending exit sequence: {e}"));
        }

        if let Err(e) = inner.transport.close().await {
            errors.push(format!("error closing pipes: {e}"));
        }

        if let Some(process) = inner.process.as_mut() {
            if let Err(e) = process.stop(StopMode::Graceful).await {
                errors.push(format!("error stopping process: {e}"));
            }
        }

        if errors.is_empty() {
            info!("Exiftool session stopped");
            Ok(())
        } else {
            warn!("Exiftool session stopped with errors: {:?}", errors);
            Err(ExifToolError::ShutdownFailed { errors })
        }
    }

    async fn send_exit_sequence(transport: &mut T) -> Result<(), T::Error> {
        for line in protocol::shutdown_lines() {
            transport.write_line(line).await?;
        }
        transport.flush().await
    }

    /// Kill the process without waiting for the request lock
    ///
    /// A request blocked on a response fails with a no-response error once
    /// the output pipe closes. Returns true if a signal was delivered.
    ///
    /// Sessions built with `with_transport` own no process, so this is a
    /// no-op returning false. For those, a hung read can only be ended by
    /// dropping the request future or closing the peer; stop() waits on the
    /// request lock and does not unblock it.
    pub fn abort(&self) -> bool {
        match &self.killer {
            Some(killer) => {
                warn!("Aborting exiftool session");
                killer.kill()
            }
            None => false,
        }
    }

    /// Check whether stop() has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get session uptime
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Get current configuration
    pub fn config(&self) -> &ExifToolConfig {
        &self.config
    }
}

/// Drop trait implementation - force cleanup fallback
impl<T: Transport> Drop for ExifToolSession<T> {
    fn drop(&mut self) {
        if let Some(process) = self.inner.get_mut().process.as_mut()
            && process.is_running()
        {
            warn!("ExifToolSession dropped without calling stop() - force killing process");
            process.kill_sync();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exiftool::config::ExifToolConfigBuilder;
    use crate::exiftool::testing::{CRASH_TARGET, EMPTY_TARGET, FakeExifTool, HANG_TARGET};
    use crate::io::MockTransport;

    // Auto-initialize logging for all tests in this module
    #[cfg(feature = "test-logging")]
    #[ctor::ctor]
    fn init_test_logging() {
        crate::test_utils::logging::init();
    }

    fn frame(target: &str) -> String {
        format!(r#"[{{"SourceFile": "{target}"}}]"#)
    }

    #[tokio::test]
    async fn test_request_line_order() {
        let transport = MockTransport::with_frames([frame("a.jpg")]);
        let session = ExifToolSession::with_transport(transport.clone(), ExifToolConfig::default());

        let bytes = session.execute(&["-n", "-fast"], "a.jpg").await.unwrap();
        assert_eq!(bytes, frame("a.jpg").as_bytes());

        assert_eq!(
            transport.sent_lines(),
            vec!["-n", "-fast", "-j", "-g2", "a.jpg", "-execute"]
        );
        assert_eq!(transport.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_sequential_requests_return_frames_in_order() {
        let (transport, fake) = FakeExifTool::new().chunk_size(5).spawn();
        let session = ExifToolSession::with_transport(transport, ExifToolConfig::default());

        for n in 0..10 {
            let target = format!("img_{n}.jpg");
            let document = session.read(&target).await.unwrap();
            assert_eq!(document["SourceFile"], target.as_str());
        }

        session.stop().await.unwrap();
        assert_eq!(fake.await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_crlf_frames() {
        let (transport, _fake) = FakeExifTool::new().crlf().chunk_size(1).spawn();
        let session = ExifToolSession::with_transport(transport, ExifToolConfig::default());

        let document = session.read("a.jpg").await.unwrap();
        assert_eq!(document["SourceFile"], "a.jpg");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_are_not_interleaved() {
        let (transport, fake) = FakeExifTool::new()
            .chunk_size(7)
            .delay(Duration::from_millis(1))
            .spawn();
        let session = Arc::new(ExifToolSession::with_transport(
            transport,
            ExifToolConfig::default(),
        ));

        let mut handles = Vec::new();
        for caller in 0..8 {
            let session = Arc::clone(&session);
            handles.push(tokio::spawn(async move {
                for n in 0..5 {
                    let target = format!("caller{caller}_{n}.jpg");
                    let flag = format!("-tag{caller}");
                    let document = session.read_with_flags(&[flag.as_str()], &target).await.unwrap();
                    assert_eq!(document["SourceFile"], target.as_str());
                    assert_eq!(document["Flags"], serde_json::json!([flag]));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        session.stop().await.unwrap();
        let requests = fake.await.unwrap();
        assert_eq!(requests.len(), 40);
        for request in requests {
            assert_eq!(request.len(), 4);
            assert_eq!(&request[1..3], ["-j", "-g2"]);
        }
    }

    #[tokio::test]
    async fn test_stop_twice_is_an_error() {
        let (transport, _fake) = FakeExifTool::new().spawn();
        let session = ExifToolSession::with_transport(transport, ExifToolConfig::default());

        session.stop().await.unwrap();
        assert!(session.is_closed());
        assert!(matches!(
            session.stop().await,
            Err(ExifToolError::AlreadyClosed)
        ));
    }

    #[tokio::test]
    async fn test_stop_sends_exit_sequence() {
        let transport = MockTransport::new();
        let session = ExifToolSession::with_transport(transport.clone(), ExifToolConfig::default());

        session.stop().await.unwrap();
        assert_eq!(transport.sent_lines(), vec!["-stay_open", "False", "-execute"]);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_execute_after_stop_does_not_touch_pipes() {
        let transport = MockTransport::new();
        let session = ExifToolSession::with_transport(transport.clone(), ExifToolConfig::default());
        session.stop().await.unwrap();
        let lines_after_stop = transport.sent_lines().len();

        let result = session.read("a.jpg").await;
        assert!(matches!(result, Err(ExifToolError::SessionClosed)));
        assert_eq!(transport.sent_lines().len(), lines_after_stop);
    }

    #[tokio::test]
    async fn test_stop_reports_close_failure_and_still_closes() {
        let transport = MockTransport::new();
        transport.fail_on_close();
        let session = ExifToolSession::with_transport(transport, ExifToolConfig::default());

        match session.stop().await {
            Err(ExifToolError::ShutdownFailed { errors }) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("closing pipes"));
            }
            other => panic!("expected shutdown failure, got {other:?}"),
        }
        assert!(session.is_closed());
        assert!(matches!(
            session.read("a.jpg").await,
            Err(ExifToolError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_stream_end_is_no_response() {
        let (transport, _fake) = FakeExifTool::new().spawn();
        let session = ExifToolSession::with_transport(transport, ExifToolConfig::default());

        let result = session.read(CRASH_TARGET).await;
        assert!(matches!(result, Err(ExifToolError::NoResponse { .. })));

        // Lock was released and the failure sticks
        assert!(matches!(
            session.read("a.jpg").await,
            Err(ExifToolError::SessionPoisoned)
        ));
    }

    #[tokio::test]
    async fn test_empty_document_list_is_no_data() {
        let (transport, _fake) = FakeExifTool::new().spawn();
        let session = ExifToolSession::with_transport(transport, ExifToolConfig::default());

        let result = session.read(EMPTY_TARGET).await;
        assert!(matches!(
            result,
            Err(ExifToolError::Document(DocumentError::NoData))
        ));

        // Decode errors leave the session usable
        let document = session.read("a.jpg").await.unwrap();
        assert_eq!(document["SourceFile"], "a.jpg");
    }

    #[tokio::test]
    async fn test_malformed_payload_is_document_error() {
        let transport = MockTransport::with_frames(["not json", r#"{"SourceFile": "a.jpg"}"#]);
        let session = ExifToolSession::with_transport(transport, ExifToolConfig::default());

        let err = session.read("a.jpg").await.unwrap_err();
        assert!(matches!(err, ExifToolError::Document(DocumentError::Json(_))));
        assert!(!err.is_fatal());

        assert!(matches!(
            session.read("a.jpg").await,
            Err(ExifToolError::Document(DocumentError::NotAnArray { .. }))
        ));
    }

    #[tokio::test]
    async fn test_timeout_poisons_session() {
        let (transport, _fake) = FakeExifTool::new().spawn();
        let config = ExifToolConfigBuilder::new()
            .response_timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let session = ExifToolSession::with_transport(transport, config);

        let result = session.read(HANG_TARGET).await;
        assert!(matches!(result, Err(ExifToolError::ResponseTimeout { .. })));

        assert!(matches!(
            session.read("a.jpg").await,
            Err(ExifToolError::SessionPoisoned)
        ));

        // A poisoned session can still be stopped
        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_request_poisons_session() {
        let (transport, _fake) = FakeExifTool::new()
            .delay(Duration::from_millis(200))
            .spawn();
        let session = ExifToolSession::with_transport(transport, ExifToolConfig::default());

        let cancelled = tokio::time::timeout(Duration::from_millis(50), session.read("a.jpg")).await;
        assert!(cancelled.is_err());

        // The frame for a.jpg is still on its way and must not reach this caller
        assert!(matches!(
            session.read("b.jpg").await,
            Err(ExifToolError::SessionPoisoned)
        ));

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_request_dropped_between_writes_poisons_session() {
        let transport = MockTransport::with_frames([frame("a.jpg")]);
        transport.stall_writes_after(2);
        let session = ExifToolSession::with_transport(transport.clone(), ExifToolConfig::default());

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            session.execute(&["-n"], "a.jpg"),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(transport.sent_lines(), vec!["-n", "-j"]);

        assert!(matches!(
            session.read("b.jpg").await,
            Err(ExifToolError::SessionPoisoned)
        ));
        assert_eq!(transport.sent_lines(), vec!["-n", "-j"]);
        assert!(transport.has_frames());
    }

    #[tokio::test]
    async fn test_invalid_target_is_rejected_before_writing() {
        let transport = MockTransport::new();
        let session = ExifToolSession::with_transport(transport.clone(), ExifToolConfig::default());

        let result = session.read("a.jpg\n-execute").await;
        assert!(matches!(result, Err(ExifToolError::InvalidRequest { .. })));
        assert!(transport.sent_lines().is_empty());
    }

    #[tokio::test]
    async fn test_typed_reads() {
        #[derive(serde::Deserialize)]
        struct Source {
            #[serde(rename = "SourceFile")]
            source_file: String,
        }

        let document = r#"[{
            "SourceFile": "a.jpg",
            "Camera": {"Make": "FUJIFILM"},
            "Image": {"ISO": 400}
        }]"#;
        let transport = MockTransport::with_frames([document, document, document]);
        let session = ExifToolSession::with_transport(transport, ExifToolConfig::default());

        let source: Source = session.unmarshal("a.jpg").await.unwrap();
        assert_eq!(source.source_file, "a.jpg");

        let data = session.exif_data("a.jpg").await.unwrap();
        assert_eq!(data.camera["Make"], "FUJIFILM");

        let compact = session.exif_compact("a.jpg").await.unwrap();
        assert_eq!(compact.iso, Some(400));
        assert_eq!(compact.camera_make.as_deref(), Some("FUJIFILM"));
    }

    #[tokio::test]
    async fn test_abort_without_process() {
        let session = ExifToolSession::with_transport(MockTransport::new(), ExifToolConfig::default());
        assert!(!session.abort());
    }

    #[tokio::test]
    async fn test_start_failure() {
        let config = ExifToolConfigBuilder::new()
            .exiftool_path("nonexistent-exiftool-binary")
            .build()
            .unwrap();

        let result = ExifToolSession::start(config).await;
        assert!(matches!(result, Err(ExifToolError::Process(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_session_lifecycle() {
        use crate::exiftool::testing::{FAKE_EXIFTOOL_SCRIPT, write_script};

        let temp_dir = tempfile::tempdir().unwrap();
        let script = write_script(temp_dir.path(), "fake-exiftool", FAKE_EXIFTOOL_SCRIPT).unwrap();
        let config = ExifToolConfigBuilder::new()
            .exiftool_path(script.to_string_lossy())
            .shutdown_grace_period(Duration::from_secs(2))
            .build()
            .unwrap();

        let session = ExifToolSession::start(config).await.unwrap();
        for target in ["a.jpg", "b.jpg"] {
            let document = session.read(target).await.unwrap();
            assert_eq!(document["SourceFile"], target);
        }

        session.stop().await.unwrap();
        assert!(matches!(
            session.read("a.jpg").await,
            Err(ExifToolError::SessionClosed)
        ));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abort_unblocks_pending_request() {
        use crate::exiftool::testing::{SILENT_EXIFTOOL_SCRIPT, write_script};

        let temp_dir = tempfile::tempdir().unwrap();
        let script = write_script(temp_dir.path(), "silent-exiftool", SILENT_EXIFTOOL_SCRIPT).unwrap();
        let config = ExifToolConfigBuilder::new()
            .exiftool_path(script.to_string_lossy())
            .build()
            .unwrap();

        let session = Arc::new(ExifToolSession::start(config).await.unwrap());

        let pending = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.read("a.jpg").await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(session.abort());

        let result = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ExifToolError::NoResponse { .. })));

        // Process already gone; stop still closes the session
        let _ = session.stop().await;
        assert!(session.is_closed());
    }

    #[cfg(feature = "exiftool-integration-tests")]
    #[tokio::test]
    async fn test_real_exiftool_reads_its_own_metadata() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("note.txt");
        std::fs::write(&file, "hello").unwrap();

        let config = ExifToolConfigBuilder::new()
            .exiftool_path(crate::test_utils::get_test_exiftool_path())
            .build()
            .unwrap();

        let session = ExifToolSession::start(config).await.unwrap();
        let data = session.exif_data(&file.to_string_lossy()).await.unwrap();
        assert!(!data.other.is_empty() || !data.document.is_empty());
        assert!(session.uptime().as_nanos() > 0);

        session.stop().await.unwrap();
    }

    #[cfg(feature = "exiftool-integration-tests")]
    #[tokio::test]
    async fn test_real_exiftool_missing_file() {
        let config = ExifToolConfigBuilder::new()
            .exiftool_path(crate::test_utils::get_test_exiftool_path())
            .response_timeout(Duration::from_secs(30))
            .build()
            .unwrap();

        let session = ExifToolSession::start(config).await.unwrap();
        let result = session.read("/nonexistent/file.jpg").await;
        assert!(matches!(result, Err(ExifToolError::Document(_))));

        session.stop().await.unwrap();
    }
}
