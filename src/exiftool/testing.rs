//! Fake exiftool implementations for session testing
//!
//! Provides an in-process fake speaking the stay-open protocol over
//! in-memory pipes, and a shell script fake for process-level tests.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

use crate::exiftool::protocol::{EXECUTE_ARG, GROUP_ARG, JSON_ARG, STAY_OPEN_ARG};
use crate::io::PipeTransport;

/// Target the fake never answers
pub const HANG_TARGET: &str = "hang.jpg";

/// Target that makes the fake exit without answering
pub const CRASH_TARGET: &str = "crash.jpg";

/// Target the fake answers with an empty document list
pub const EMPTY_TARGET: &str = "empty.jpg";

/// Transport connected to an in-process fake exiftool
pub type FakeTransport = PipeTransport<DuplexStream, DuplexStream>;

// ============================================================================
// In-process Fake
// ============================================================================

/// In-process fake exiftool
///
/// Answers each request with `[{"SourceFile": <target>, "Flags": [...]}]`
/// followed by the ready token, so every frame names the request it answers.
#[derive(Debug, Clone)]
pub struct FakeExifTool {
    line_ending: &'static str,
    chunk_size: usize,
    delay: Option<Duration>,
}

impl Default for FakeExifTool {
    fn default() -> Self {
        Self {
            line_ending: "\n",
            chunk_size: usize::MAX,
            delay: None,
        }
    }
}

impl FakeExifTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminate output lines with CRLF
    pub fn crlf(mut self) -> Self {
        self.line_ending = "\r\n";
        self
    }

    /// Write responses in chunks of `size` bytes, yielding between them
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Wait before answering each request
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Start the fake; the handle resolves to every request it received
    pub fn spawn(self) -> (FakeTransport, JoinHandle<Vec<Vec<String>>>) {
        let (session_stdout, tool_stdout) = tokio::io::duplex(64 * 1024);
        let (session_stdin, tool_stdin) = tokio::io::duplex(64 * 1024);

        let handle = tokio::spawn(self.run(tool_stdin, tool_stdout));
        (PipeTransport::new(session_stdout, session_stdin), handle)
    }

    async fn run(self, stdin: DuplexStream, mut stdout: DuplexStream) -> Vec<Vec<String>> {
        let mut lines = BufReader::new(stdin).lines();
        let mut requests = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        while let Ok(Some(line)) = lines.next_line().await {
            if line != EXECUTE_ARG {
                pending.push(line);
                continue;
            }

            let request = std::mem::take(&mut pending);
            if request == [STAY_OPEN_ARG, "False"] {
                break;
            }

            let target = request.last().cloned().unwrap_or_default();
            requests.push(request.clone());

            match target.as_str() {
                HANG_TARGET => continue,
                CRASH_TARGET => break,
                _ => {}
            }

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let response = self.response_for(&request, &target);
            if self.write_chunked(&mut stdout, response.as_bytes()).await.is_err() {
                break;
            }
        }

        requests
    }

    fn response_for(&self, request: &[String], target: &str) -> String {
        let payload = if target == EMPTY_TARGET {
            "[]".to_string()
        } else {
            let flags: Vec<&String> = request
                .iter()
                .take(request.len().saturating_sub(1))
                .filter(|arg| *arg != JSON_ARG && *arg != GROUP_ARG)
                .collect();
            serde_json::json!([{ "SourceFile": target, "Flags": flags }]).to_string()
        };
        format!(
            "{payload}{ending}{{ready}}{ending}",
            ending = self.line_ending
        )
    }

    async fn write_chunked(&self, stdout: &mut DuplexStream, bytes: &[u8]) -> std::io::Result<()> {
        for chunk in bytes.chunks(self.chunk_size) {
            stdout.write_all(chunk).await?;
            stdout.flush().await?;
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

// ============================================================================
// Process-level Fakes
// ============================================================================

/// Shell fake answering `[{"SourceFile":"<target>"}]` per request
#[cfg(unix)]
pub const FAKE_EXIFTOOL_SCRIPT: &str = r#"#!/bin/sh
prev=""
while IFS= read -r line; do
  case "$line" in
    -execute)
      if [ "$prev" = "False" ]; then exit 0; fi
      printf '[{"SourceFile":"%s"}]\n{ready}\n' "$prev"
      ;;
    *) prev="$line" ;;
  esac
done
"#;

/// Shell fake that reads requests and never answers
#[cfg(unix)]
pub const SILENT_EXIFTOOL_SCRIPT: &str = "#!/bin/sh\nwhile IFS= read -r line; do :; done\n";

/// Write an executable script into `dir` and return its path
#[cfg(unix)]
pub fn write_script(
    dir: &std::path::Path,
    name: &str,
    contents: &str,
) -> std::io::Result<std::path::PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, contents)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Transport;

    #[tokio::test]
    async fn test_fake_answers_with_target() {
        let (mut transport, handle) = FakeExifTool::new().spawn();

        for line in ["-n", "-j", "-g2", "a.jpg", "-execute"] {
            transport.write_line(line).await.unwrap();
        }
        transport.flush().await.unwrap();

        let frame = transport.read_frame().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value[0]["SourceFile"], "a.jpg");
        assert_eq!(value[0]["Flags"], serde_json::json!(["-n"]));

        transport.close().await.unwrap();
        let requests = handle.await.unwrap();
        assert_eq!(requests, vec![vec!["-n", "-j", "-g2", "a.jpg"]]);
    }

    #[tokio::test]
    async fn test_fake_exits_on_shutdown_sequence() {
        let (mut transport, handle) = FakeExifTool::new().spawn();

        for line in ["-stay_open", "False", "-execute"] {
            transport.write_line(line).await.unwrap();
        }
        transport.flush().await.unwrap();

        assert!(handle.await.unwrap().is_empty());
        assert!(transport.read_frame().await.unwrap().is_none());
    }
}
