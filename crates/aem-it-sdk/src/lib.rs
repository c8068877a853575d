// aem-it-sdk: Foundation layer for the AEM integration-test stage runner.
// This crate has no dependencies on the runner crate and provides process
// invocation, trace output, and filesystem utilities.

pub mod fs_util;
pub mod process_invoker;
pub mod trace;

// Re-export commonly used items at crate root
pub use fs_util::FsUtil;
pub use process_invoker::{CommandLine, ProcessExitCodeError, ProcessInvoker};
pub use trace::{BufferTraceWriter, NullTraceWriter, TraceLevel, TraceWriter, TracingTraceWriter};
