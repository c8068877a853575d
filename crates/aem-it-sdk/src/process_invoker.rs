// Subprocess execution for the stage runner. One child at a time, synchronous
// wait, stdout/stderr forwarded line-by-line to a TraceWriter. No timeouts and
// no retries: a hung tool hangs the stage, which the CI system handles.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::trace::TraceWriter;

/// Error type for non-zero child exit codes.
#[derive(Debug, thiserror::Error)]
#[error("exit code {exit_code} returned from '{program}' (arguments: {arguments:?})")]
pub struct ProcessExitCodeError {
    pub exit_code: i32,
    pub program: String,
    pub arguments: Vec<String>,
}

/// A fully assembled subprocess invocation.
///
/// Built up by the runner's command-assembly functions, which keeps those
/// functions pure and unit-testable without the external tools installed.
#[derive(Debug, Clone, Default)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// One-line rendering for log output.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.contains(' ') {
                out.push('"');
                out.push_str(arg);
                out.push('"');
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

/// Spawns child processes and waits for them, forwarding output to a
/// `TraceWriter`.
pub struct ProcessInvoker {
    trace: Arc<dyn TraceWriter>,
}

impl ProcessInvoker {
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        Self { trace }
    }

    /// Run the command to completion, requiring a zero exit code.
    ///
    /// Both output streams are forwarded to the trace writer.
    pub async fn execute(&self, cmd: &CommandLine) -> Result<()> {
        let (exit_code, _) = self.run(cmd, false).await?;
        if exit_code != 0 {
            return Err(ProcessExitCodeError {
                exit_code,
                program: cmd.program.clone(),
                arguments: cmd.args.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Run the command to completion, requiring a zero exit code, and return
    /// the trimmed captured stdout. Stderr is still forwarded to the trace
    /// writer. Used for version queries.
    pub async fn execute_capture(&self, cmd: &CommandLine) -> Result<String> {
        let (exit_code, captured) = self.run(cmd, true).await?;
        if exit_code != 0 {
            return Err(ProcessExitCodeError {
                exit_code,
                program: cmd.program.clone(),
                arguments: cmd.args.clone(),
            }
            .into());
        }
        Ok(captured.trim().to_string())
    }

    async fn run(&self, cmd: &CommandLine, capture_stdout: bool) -> Result<(i32, String)> {
        assert!(!cmd.program.is_empty(), "program must not be empty");

        self.trace.verbose(&format!("Starting process: {}", cmd.display()));
        if let Some(ref dir) = cmd.current_dir {
            self.trace
                .verbose(&format!("  Working directory: '{}'", dir.display()));
        }

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        if let Some(ref dir) = cmd.current_dir {
            command.current_dir(dir);
        }
        for (key, value) in &cmd.env {
            command.env(key, value);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start process '{}'", cmd.display()))?;

        let pid = child.id().unwrap_or(0);
        self.trace
            .verbose(&format!("Process started with pid {pid}, waiting for exit."));

        let stdout = child.stdout.take();
        let stdout_trace = self.trace.clone();
        let stdout_task = tokio::spawn(async move {
            let mut captured = String::new();
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if capture_stdout {
                        captured.push_str(&line);
                        captured.push('\n');
                    } else {
                        stdout_trace.info(&line);
                    }
                }
            }
            captured
        });

        let stderr = child.stderr.take();
        let stderr_trace = self.trace.clone();
        let stderr_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    stderr_trace.warning(&line);
                }
            }
        });

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for process '{}'", cmd.program))?;
        let exit_code = status.code().unwrap_or(-1);

        let captured = stdout_task.await.unwrap_or_default();
        let _ = stderr_task.await;

        self.trace.verbose(&format!(
            "Process {pid} finished with exit code {exit_code} after {:.2?}.",
            start.elapsed()
        ));

        Ok((exit_code, captured))
    }
}
