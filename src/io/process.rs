//! Process management layer
//!
//! Handles external process lifecycle and stderr draining,
//! completely separate from transport concerns.

use crate::io::transport::StdioTransport;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Default time a graceful stop waits for the process to exit on its own
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

// ============================================================================
// Process State Management
// ============================================================================

/// How to stop a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Wait for the process to exit by itself, force kill after the grace period
    Graceful,
    /// Force kill immediately (SIGKILL)
    Force,
}

/// Process lifecycle states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// Process has not been started yet
    NotStarted,
    /// Process is currently running
    Running { pid: u32 },
    /// Process has exited or been stopped
    Stopped,
}

impl ProcessState {
    /// Get the process ID if the process is running
    pub fn pid(&self) -> Option<u32> {
        match self {
            ProcessState::Running { pid } => Some(*pid),
            _ => None,
        }
    }

    /// Check if the process is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running { .. })
    }
}

// ============================================================================
// Stderr Monitoring Trait
// ============================================================================

/// Trait for monitoring stderr output from external processes
pub trait StderrMonitor: Send + Sync {
    /// Install a handler for stderr lines
    ///
    /// Only one handler can be active at a time. Installing a new handler
    /// replaces the previous one. The handler must be installed before the
    /// process starts.
    fn on_stderr_line<F>(&mut self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static;
}

// ============================================================================
// Process Management
// ============================================================================

/// Error types for process management
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Process not started")]
    NotStarted,

    #[error("Process already started")]
    AlreadyStarted,

    #[error("Stdin not available")]
    StdinNotAvailable,

    #[error("Stdout not available")]
    StdoutNotAvailable,

    #[error("Stderr not available")]
    StderrNotAvailable,
}

/// Trait for managing external process lifecycle
#[async_trait]
pub trait ProcessManager: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start the external process
    async fn start(&mut self) -> Result<(), Self::Error>;

    /// Stop the external process
    async fn stop(&mut self, mode: StopMode) -> Result<(), Self::Error>;

    /// Check if the process is currently running
    fn is_running(&self) -> bool;

    /// Hand out the stdio transport for the process
    ///
    /// The stdin/stdout pipes are moved into the transport, so this succeeds
    /// at most once per start.
    fn create_stdio_transport(&mut self) -> Result<StdioTransport, Self::Error>;

    /// Synchronous force kill for Drop implementations
    fn kill_sync(&mut self);
}

/// Cloneable handle that can kill the process without borrowing its manager
#[derive(Debug, Clone)]
pub struct ProcessKiller {
    state: Arc<Mutex<ProcessState>>,
}

impl ProcessKiller {
    /// Send SIGKILL to the process if it is still running
    ///
    /// Returns true if a signal was delivered.
    pub fn kill(&self) -> bool {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let pid = match self.state.lock().unwrap().pid() {
            Some(pid) => pid,
            None => return false,
        };
        send_kill(pid)
    }
}

/// Manages child processes spawned via Command
pub struct ChildProcessManager {
    /// Command to execute
    command: String,

    /// Command arguments
    args: Vec<String>,

    /// Working directory for the process (optional)
    working_directory: Option<PathBuf>,

    /// Time a graceful stop waits before force killing
    grace_period: Duration,

    /// Thread-safe process state
    state: Arc<Mutex<ProcessState>>,

    /// Flips to true once the wait task has reaped the child
    exited: Option<watch::Receiver<bool>>,

    /// Stdio transport (created when process starts)
    stdio_transport: Option<StdioTransport>,

    /// Stderr handler
    stderr_handler: Option<Box<dyn Fn(String) + Send + Sync>>,

    /// Stderr monitoring task handle
    stderr_task: Option<JoinHandle<()>>,

    /// Process wait task handle (waits for child to exit)
    wait_task: Option<JoinHandle<()>>,
}

impl ChildProcessManager {
    /// Create a new child process manager
    ///
    /// # Arguments
    /// * `command` - The command to execute
    /// * `args` - Command line arguments
    /// * `working_dir` - Optional working directory for the process
    pub fn new(command: String, args: Vec<String>, working_dir: Option<PathBuf>) -> Self {
        Self {
            command,
            args,
            working_directory: working_dir,
            grace_period: DEFAULT_GRACE_PERIOD,
            state: Arc::new(Mutex::new(ProcessState::NotStarted)),
            exited: None,
            stdio_transport: None,
            stderr_handler: None,
            stderr_task: None,
            wait_task: None,
        }
    }

    /// Set how long a graceful stop waits for the process to exit
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Get current process state (thread-safe)
    pub fn get_state(&self) -> ProcessState {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.state.lock().unwrap().clone()
    }

    /// Handle that can kill the process from anywhere
    pub fn killer(&self) -> ProcessKiller {
        ProcessKiller {
            state: Arc::clone(&self.state),
        }
    }

    /// Wait until the child has been reaped, up to `timeout`
    ///
    /// Returns true if the process exited within the timeout.
    pub async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let Some(mut exited) = self.exited.clone() else {
            return !self.is_running();
        };

        tokio::time::timeout(timeout, exited.wait_for(|done| *done))
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false)
    }

    /// Spawn the stderr monitoring task with a provided stderr pipe
    ///
    /// Always drains stderr to prevent the child process from blocking.
    /// If a handler is installed, lines are forwarded to it.
    fn spawn_stderr_monitor(&mut self, stderr: tokio::process::ChildStderr) {
        if self.stderr_task.is_some() {
            return;
        }

        let handler = self.stderr_handler.take();

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        trace!("ChildProcessManager: stderr EOF reached");
                        break;
                    }
                    Ok(_) => {
                        let line_content = line.trim().to_string();
                        if line_content.is_empty() {
                            continue;
                        }
                        match &handler {
                            Some(handler) => handler(line_content),
                            None => trace!("ChildProcessManager: stderr drained: {}", line_content),
                        }
                    }
                    Err(e) => {
                        error!("Failed to read from stderr: {}", e);
                        break;
                    }
                }
            }
        });

        self.stderr_task = Some(task);
    }

    /// Spawn the wait task that reaps the child and records its exit
    fn spawn_wait_task(&mut self, mut child: Child) {
        let current_pid = self.get_state().pid();
        let state = Arc::clone(&self.state);
        let (exited_tx, exited_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            match child.wait().await {
                Ok(exit_status) => {
                    info!(
                        "Process PID {:?} exited with status: {}",
                        current_pid, exit_status
                    );
                }
                Err(e) => {
                    error!("Error waiting for child process: {}", e);
                }
            }

            if let Ok(mut process_state) = state.lock() {
                *process_state = ProcessState::Stopped;
            }
            let _ = exited_tx.send(true);
        });

        self.exited = Some(exited_rx);
        self.wait_task = Some(task);
    }
}

#[async_trait]
impl ProcessManager for ChildProcessManager {
    type Error = ProcessError;

    async fn start(&mut self) -> Result<(), Self::Error> {
        if self.is_running() {
            return Err(ProcessError::AlreadyStarted);
        }

        info!("Starting process: {} {:?}", self.command, self.args);

        // Pipes are configured before spawning; the handles are taken right after
        let mut command_builder = Command::new(&self.command);
        command_builder
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(working_dir) = &self.working_directory {
            command_builder.current_dir(working_dir);
        }

        let mut child = command_builder
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let Some(pid) = child.id() else {
            return Err(ProcessError::Io(io::Error::other("Failed to get process ID")));
        };
        info!("Process started with PID: {}", pid);

        let stdin = child.stdin.take().ok_or(ProcessError::StdinNotAvailable)?;
        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::StdoutNotAvailable)?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::StderrNotAvailable)?;

        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.state.lock().unwrap() = ProcessState::Running { pid };

        self.stdio_transport = Some(StdioTransport::new(stdout, stdin));
        self.spawn_stderr_monitor(stderr);
        self.spawn_wait_task(child);

        Ok(())
    }

    async fn stop(&mut self, mode: StopMode) -> Result<(), Self::Error> {
        let pid = match self.get_state() {
            ProcessState::Running { pid } => pid,
            ProcessState::NotStarted => return Err(ProcessError::NotStarted),
            // Already exited on its own; nothing left to signal
            ProcessState::Stopped if self.wait_task.is_some() => {
                self.wait_task.take();
                self.stderr_task.take();
                return Ok(());
            }
            ProcessState::Stopped => return Err(ProcessError::NotStarted),
        };

        // Dropping an unclaimed transport closes the pipes
        self.stdio_transport.take();

        match mode {
            StopMode::Graceful => {
                debug!(
                    "Waiting up to {:?} for process {} to exit",
                    self.grace_period, pid
                );
                if !self.wait_for_exit(self.grace_period).await {
                    warn!(
                        "Process {} did not exit within {:?}, killing",
                        pid, self.grace_period
                    );
                    send_kill(pid);
                }
            }
            StopMode::Force => {
                send_kill(pid);
            }
        }

        // Let the stderr task run to EOF so late lines still reach the handler
        self.stderr_task.take();
        self.wait_task.take();

        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.state.lock().unwrap() = ProcessState::Stopped;

        Ok(())
    }

    fn is_running(&self) -> bool {
        self.get_state().is_running()
    }

    fn create_stdio_transport(&mut self) -> Result<StdioTransport, Self::Error> {
        self.stdio_transport.take().ok_or(ProcessError::NotStarted)
    }

    fn kill_sync(&mut self) {
        let Some(pid) = self.get_state().pid() else {
            return;
        };

        info!("Synchronously force killing process with PID: {}", pid);
        send_kill(pid);

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.state.lock().unwrap() = ProcessState::Stopped;
    }
}

impl StderrMonitor for ChildProcessManager {
    fn on_stderr_line<F>(&mut self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.stderr_handler = Some(Box::new(handler));
    }
}

/// Deliver SIGKILL to `pid`
fn send_kill(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let delivered = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) == 0 };
        if delivered {
            info!("Sent SIGKILL to process {}", pid);
        }
        delivered
    }
    #[cfg(not(unix))]
    {
        warn!("Process kill not implemented on this platform (pid {})", pid);
        false
    }
}
