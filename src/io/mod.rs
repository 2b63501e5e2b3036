//! I/O layer - process management and pipe transport
//!
//! - **Process**: external process lifecycle with stdio integration
//! - **Transport**: line-oriented writes and framed reads over a pipe pair

pub mod process;
pub mod transport;

// Re-export main types for convenience
pub use process::{
    ChildProcessManager, ProcessError, ProcessKiller, ProcessManager, ProcessState,
    StderrMonitor, StopMode,
};
pub use transport::{MockTransport, PipeTransport, PipeTransportError, StdioTransport, Transport};
