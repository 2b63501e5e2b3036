//! Response framing for the stay-open protocol
//!
//! exiftool terminates every response to an `-execute` with a ready token on
//! its own line:
//!
//! ```text
//! [{"SourceFile": "a.jpg", ...}]
//! {ready}
//! ```
//!
//! The token is `{ready}\n`, or `{ready}\r\n` where the tool writes CRLF line
//! endings. The bytes in front of the token are one response frame; the token
//! itself is never part of the payload.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::exiftool::protocol::{READY_TOKEN_CRLF, READY_TOKEN_LF};

/// Upper bound on a single frame to prevent memory exhaustion
pub const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024; // 256MB

/// Error types for response framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {size} bytes without a ready token (max: {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// Outcome of scanning a buffer for the next frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Split {
    /// A complete frame: the payload is `buffer[..payload_len]`, consume `advance` bytes
    Frame { payload_len: usize, advance: usize },
    /// A complete frame that ends exactly at end of stream; nothing more to scan
    FinalFrame { payload_len: usize, advance: usize },
    /// No token yet; read more bytes before scanning again
    NeedMore,
    /// Stream ended without another token; the whole buffer is an unconsumed remainder
    EndOfStream { remainder: usize },
}

/// Locate the next ready-token-delimited frame in `buffer`
///
/// The earliest occurrence of either token variant wins. "Need more data" is
/// only ever reported while `at_eof` is false, so a token split across two
/// reads is found once the rest of it arrives.
pub fn split_ready_token(buffer: &[u8], at_eof: bool) -> Split {
    let lf = find(buffer, READY_TOKEN_LF).map(|pos| (pos, READY_TOKEN_LF.len()));
    let crlf = find(buffer, READY_TOKEN_CRLF).map(|pos| (pos, READY_TOKEN_CRLF.len()));

    let token = match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };

    match token {
        Some((pos, len)) if at_eof && buffer.len() == pos + len => Split::FinalFrame {
            payload_len: pos,
            advance: pos + len,
        },
        Some((pos, len)) => Split::Frame {
            payload_len: pos,
            advance: pos + len,
        },
        None if at_eof => Split::EndOfStream {
            remainder: buffer.len(),
        },
        None => Split::NeedMore,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Decoder that yields one `Bytes` payload per ready token
///
/// Meant to be driven by [`tokio_util::codec::FramedRead`]. Each frame is
/// split off the read buffer and frozen, so the caller owns it and the
/// reader's buffer is free to be reused.
#[derive(Debug, Default)]
pub struct ReadyFrameCodec {
    /// Bytes already scanned without finding a token
    scanned: usize,
}

impl ReadyFrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_frame(&mut self, src: &mut BytesMut, payload_len: usize, advance: usize) -> Bytes {
        let mut frame = src.split_to(advance);
        frame.truncate(payload_len);
        self.scanned = 0;
        trace!("ReadyFrameCodec: frame of {} bytes", payload_len);
        frame.freeze()
    }

    /// Skip the part of the buffer that cannot contain the start of a token
    fn rescan_from(&self) -> usize {
        self.scanned.saturating_sub(READY_TOKEN_CRLF.len() - 1)
    }
}

impl Decoder for ReadyFrameCodec {
    type Item = Bytes;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let offset = self.rescan_from();
        match split_ready_token(&src[offset..], false) {
            Split::Frame {
                payload_len,
                advance,
            }
            | Split::FinalFrame {
                payload_len,
                advance,
            } => Ok(Some(self.take_frame(
                src,
                offset + payload_len,
                offset + advance,
            ))),
            Split::NeedMore | Split::EndOfStream { .. } => {
                if src.len() > MAX_FRAME_SIZE {
                    return Err(FramingError::FrameTooLarge {
                        size: src.len(),
                        max: MAX_FRAME_SIZE,
                    });
                }
                self.scanned = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match split_ready_token(src, true) {
            Split::Frame {
                payload_len,
                advance,
            }
            | Split::FinalFrame {
                payload_len,
                advance,
            } => Ok(Some(self.take_frame(src, payload_len, advance))),
            Split::EndOfStream { remainder } => {
                if remainder > 0 {
                    trace!(
                        "ReadyFrameCodec: {} trailing bytes without a ready token at EOF",
                        remainder
                    );
                }
                Ok(None)
            }
            Split::NeedMore => Ok(None),
        }
    }
}
