/// Severity of a trace line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

/// Destination for diagnostic output and subprocess stdout/stderr lines.
///
/// The stage runner pushes every line a child process emits through one of
/// these, so tests can capture subprocess output without touching the global
/// tracing subscriber.
pub trait TraceWriter: Send + Sync {
    /// Write a single line at the given level.
    fn line(&self, level: TraceLevel, message: &str);

    fn verbose(&self, message: &str) {
        self.line(TraceLevel::Verbose, message);
    }

    fn info(&self, message: &str) {
        self.line(TraceLevel::Info, message);
    }

    fn warning(&self, message: &str) {
        self.line(TraceLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.line(TraceLevel::Error, message);
    }
}

/// Forwards trace lines to the `tracing` crate at matching levels.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTraceWriter;

impl TraceWriter for TracingTraceWriter {
    fn line(&self, level: TraceLevel, message: &str) {
        match level {
            TraceLevel::Verbose => tracing::debug!("{}", message),
            TraceLevel::Info => tracing::info!("{}", message),
            TraceLevel::Warning => tracing::warn!("{}", message),
            TraceLevel::Error => tracing::error!("{}", message),
        }
    }
}

/// Discards all trace lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTraceWriter;

impl TraceWriter for NullTraceWriter {
    fn line(&self, _level: TraceLevel, _message: &str) {}
}

/// Buffers trace lines in memory so tests can assert on subprocess output.
#[derive(Debug, Default)]
pub struct BufferTraceWriter {
    lines: parking_lot::Mutex<Vec<(TraceLevel, String)>>,
}

impl BufferTraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All buffered lines, in the order they were written.
    pub fn lines(&self) -> Vec<(TraceLevel, String)> {
        self.lines.lock().clone()
    }

    /// True if any buffered line at the given level contains `needle`.
    pub fn contains(&self, level: TraceLevel, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl TraceWriter for BufferTraceWriter {
    fn line(&self, level: TraceLevel, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}
