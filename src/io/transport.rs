//! Transport layer - line-oriented requests, framed responses
//!
//! The transport is the minimal capability a session needs from its
//! subprocess: write a line, read the next response frame, close. Keeping it
//! behind a trait lets tests swap the real pipes for in-memory ones.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout};
use tokio_util::codec::FramedRead;
use tracing::trace;

use crate::exiftool::framing::{FramingError, ReadyFrameCodec};

/// Core transport trait for line-oriented request/frame exchange
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Write one line; the newline terminator is added by the transport
    async fn write_line(&mut self, line: &str) -> Result<(), Self::Error>;

    /// Push buffered lines through to the process
    async fn flush(&mut self) -> Result<(), Self::Error>;

    /// Wait for the next complete response frame
    ///
    /// Returns `Ok(None)` once the output stream has ended.
    async fn read_frame(&mut self) -> Result<Option<Bytes>, Self::Error>;

    /// Close both directions
    ///
    /// Both halves are closed even if one fails; the failures are reported
    /// together.
    async fn close(&mut self) -> Result<(), Self::Error>;

    /// Check if transport is still open
    fn is_connected(&self) -> bool;
}

// ============================================================================
// Pipe Transport Implementation
// ============================================================================

/// Error types for pipe transport
#[derive(Debug, thiserror::Error)]
pub enum PipeTransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Transport is disconnected")]
    Disconnected,

    #[error("Failed to close transport: {}", .errors.join("; "))]
    Close { errors: Vec<String> },
}

/// Transport over an output pipe (`reader`) and input pipe (`writer`)
pub struct PipeTransport<R, W> {
    /// Response frames scanned out of the output pipe
    frames: Option<FramedRead<R, ReadyFrameCodec>>,

    /// Input pipe of the process
    writer: Option<W>,

    /// Connection status
    connected: bool,
}

/// Transport over a child process's stdout/stdin
pub type StdioTransport = PipeTransport<ChildStdout, ChildStdin>;

impl<R, W> PipeTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    /// Create a transport reading frames from `reader` and writing lines to `writer`
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            frames: Some(FramedRead::new(reader, ReadyFrameCodec::new())),
            writer: Some(writer),
            connected: true,
        }
    }
}

#[async_trait]
impl<R, W> Transport for PipeTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    type Error = PipeTransportError;

    async fn write_line(&mut self, line: &str) -> Result<(), Self::Error> {
        let writer = self
            .writer
            .as_mut()
            .ok_or(PipeTransportError::Disconnected)?;

        trace!("PipeTransport: Writing line: {}", line);
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        let writer = self
            .writer
            .as_mut()
            .ok_or(PipeTransportError::Disconnected)?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Option<Bytes>, Self::Error> {
        let frames = self
            .frames
            .as_mut()
            .ok_or(PipeTransportError::Disconnected)?;

        match frames.next().await {
            Some(frame) => Ok(Some(frame?)),
            None => {
                trace!("PipeTransport: output stream ended");
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(PipeTransportError::Disconnected);
        }
        self.connected = false;

        let mut errors = Vec::new();

        // Output pipe first; dropping the reader releases it
        if self.frames.take().is_none() {
            errors.push("output pipe already released".to_string());
        }

        match self.writer.take() {
            Some(mut writer) => {
                if let Err(e) = writer.shutdown().await {
                    errors.push(format!("error while closing input pipe: {e}"));
                }
            }
            None => errors.push("input pipe already released".to_string()),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PipeTransportError::Close { errors })
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Mock Transport Implementation
// ============================================================================

/// Error type for mock transport
#[derive(Debug, thiserror::Error)]
pub enum MockTransportError {
    #[error("Transport is disconnected")]
    Disconnected,

    #[error("Simulated close failure")]
    CloseFailed,
}

/// Mock transport for testing - records written lines, replays scripted frames
///
/// Clones share state, so a test can keep a handle after moving the
/// transport into a session.
#[derive(Clone, Default)]
pub struct MockTransport {
    /// Lines written via this transport
    sent_lines: Arc<Mutex<Vec<String>>>,

    /// Frames returned by read_frame(); an empty queue reads as end of stream
    frames: Arc<Mutex<VecDeque<Bytes>>>,

    /// Number of flush() calls
    flushes: Arc<Mutex<usize>>,

    /// Whether close() should report a failure
    fail_close: Arc<AtomicBool>,

    /// Line count after which write_line() never completes
    stall_after: Arc<Mutex<Option<usize>>>,

    /// Connection status
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport with predefined frames
    pub fn with_frames<I, B>(frames: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let transport = Self::new();
        for frame in frames {
            transport.add_frame(frame);
        }
        transport
    }

    /// Queue a frame for the next read_frame() call
    pub fn add_frame(&self, frame: impl Into<Bytes>) {
        self.frames.lock().unwrap().push_back(frame.into());
    }

    /// Make close() fail after releasing its state
    pub fn fail_on_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    /// Make write_line() hang once `lines` lines have been written
    pub fn stall_writes_after(&self, lines: usize) {
        *self.stall_after.lock().unwrap() = Some(lines);
    }

    /// All lines written so far
    pub fn sent_lines(&self) -> Vec<String> {
        self.sent_lines.lock().unwrap().clone()
    }

    /// Number of times the transport was flushed
    pub fn flush_count(&self) -> usize {
        *self.flushes.lock().unwrap()
    }

    /// Check if there are more frames queued
    pub fn has_frames(&self) -> bool {
        !self.frames.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn write_line(&mut self, line: &str) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(MockTransportError::Disconnected);
        }
        let stalled = {
            let written = self.sent_lines.lock().unwrap().len();
            matches!(*self.stall_after.lock().unwrap(), Some(limit) if written >= limit)
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        self.sent_lines.lock().unwrap().push(line.to_string());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(MockTransportError::Disconnected);
        }
        *self.flushes.lock().unwrap() += 1;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Option<Bytes>, Self::Error> {
        if !self.is_connected() {
            return Err(MockTransportError::Disconnected);
        }
        Ok(self.frames.lock().unwrap().pop_front())
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(MockTransportError::Disconnected);
        }
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(MockTransportError::CloseFailed);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================
