//! Subprocess invocation of the CodeQL CLI
//!
//! Arguments are always passed as a discrete list, never through a shell. Output is
//! streamed into the log line by line while the last few lines of each stream are
//! kept for error reports.

use crate::error::ScanError;
use crate::types::ToolPhase;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Number of trailing output lines kept per stream
pub const DEFAULT_TAIL_LINES: usize = 20;

/// How long output is still read after the tool exits
pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// A fully assembled tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Value following `flag`, if the flag is present
    pub fn flag_value(&self, flag: &str) -> Option<&OsString> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Typed outcome of a finished invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStatus {
    Succeeded,
    Failed { code: Option<i32> },
}

/// Result of running the tool once
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub phase: ToolPhase,
    pub status: InvocationStatus,
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == InvocationStatus::Succeeded
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            InvocationStatus::Succeeded => Some(0),
            InvocationStatus::Failed { code } => code,
        }
    }

    /// Turns a failed status into [`ScanError::ToolInvocation`]
    pub fn into_result(self) -> Result<Self, ScanError> {
        match self.status {
            InvocationStatus::Succeeded => Ok(self),
            InvocationStatus::Failed { code } => {
                let mut output_tail = self.stderr_tail;
                if output_tail.is_empty() {
                    output_tail = self.stdout_tail;
                }
                Err(ScanError::ToolInvocation {
                    phase: self.phase,
                    code,
                    output_tail,
                })
            }
        }
    }
}

/// Runs tool invocations to completion
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, phase: ToolPhase, command: &CommandSpec) -> Result<ToolOutput, ScanError>;
}

/// Cancellation shared by every step of one scan
///
/// Cloning is cheap; all clones observe the same trigger.
#[derive(Debug, Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Interrupt {
    fn default() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl Interrupt {
    /// An interrupt that only trips when [`Interrupt::trigger`] is called
    pub fn new() -> Self {
        Self::default()
    }

    /// An interrupt tripped by the first Ctrl-C
    ///
    /// Installing the listener replaces the default SIGINT behaviour for the rest
    /// of the process, so every long-running step must observe this interrupt.
    /// Must be called from within a Tokio runtime.
    pub fn on_ctrl_c() -> Self {
        let interrupt = Self::new();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Interrupted");
                    trigger.trigger();
                }
                Err(e) => debug!(error = %e, "Ctrl-C listener unavailable"),
            }
        });
        interrupt
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the interrupt has been triggered
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

/// Runner backed by `tokio::process`, with a bounded wait and cancellation
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    timeout: Option<Duration>,
    tail_lines: usize,
    drain_grace: Duration,
    interrupt: Interrupt,
}

impl TokioProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            tail_lines: DEFAULT_TAIL_LINES,
            drain_grace: OUTPUT_DRAIN_GRACE,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_tail_lines(mut self, tail_lines: usize) -> Self {
        self.tail_lines = tail_lines;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Time allowed after exit for the output pipes to close
    fn drain_budget(&self, elapsed: Duration) -> Duration {
        match self.timeout {
            Some(timeout) => self.drain_grace.min(timeout.saturating_sub(elapsed)),
            None => self.drain_grace,
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, phase: ToolPhase, command: &CommandSpec) -> Result<ToolOutput, ScanError> {
        let start = Instant::now();
        debug!(%phase, command = %command, "Spawning codeql");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| ScanError::Spawn {
            phase,
            program: command.program.clone(),
            source,
        })?;

        let stdout_tail = Tail::new(self.tail_lines);
        let stderr_tail = Tail::new(self.tail_lines);
        let mut stdout = tokio::spawn(forward_lines(child.stdout.take(), Stream::Stdout, stdout_tail.clone()));
        let mut stderr = tokio::spawn(forward_lines(child.stderr.take(), Stream::Stderr, stderr_tail.clone()));

        let waited = tokio::select! {
            status = child.wait() => status
                .map_err(|e| ScanError::io(format!("Failed to wait for codeql {}", phase), e)),
            _ = wait_for_deadline(self.timeout) => {
                let after = self.timeout.unwrap_or_default();
                warn!(%phase, timeout_secs = after.as_secs(), "codeql timed out, killing it");
                let _ = child.kill().await;
                Err(ScanError::TimedOut { phase, after })
            }
            _ = self.interrupt.triggered() => {
                warn!(%phase, "Interrupted, killing codeql");
                let _ = child.kill().await;
                Err(ScanError::Cancelled { phase })
            }
        };

        let status = match waited {
            Ok(status) => status,
            Err(e) => {
                stdout.abort();
                stderr.abort();
                return Err(e);
            }
        };

        // Processes spawned by the build may inherit the pipes and outlive the tool
        let drain = async {
            let _ = (&mut stdout).await;
            let _ = (&mut stderr).await;
        };
        if tokio::time::timeout(self.drain_budget(start.elapsed()), drain)
            .await
            .is_err()
        {
            debug!(%phase, "codeql output still open after exit, detaching");
        }
        stdout.abort();
        stderr.abort();

        let duration = start.elapsed();
        let status = if status.success() {
            InvocationStatus::Succeeded
        } else {
            InvocationStatus::Failed {
                code: status.code(),
            }
        };
        debug!(%phase, ?status, duration_ms = duration.as_millis(), "codeql finished");

        Ok(ToolOutput {
            phase,
            status,
            stdout_tail: stdout_tail.take(),
            stderr_tail: stderr_tail.take(),
            duration,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Last lines of one output stream, shared with its forwarding task
#[derive(Debug, Clone)]
struct Tail {
    lines: Arc<Mutex<VecDeque<String>>>,
    keep: usize,
}

impl Tail {
    fn new(keep: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(keep))),
            keep,
        }
    }

    fn push(&self, line: &str) {
        if self.keep == 0 {
            return;
        }
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == self.keep {
                lines.pop_front();
            }
            lines.push_back(line.to_string());
        }
    }

    fn take(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|mut lines| lines.drain(..).collect())
            .unwrap_or_default()
    }
}

/// Logs every line until EOF; invalid UTF-8 is replaced, never fatal
async fn forward_lines<R>(reader: Option<R>, stream: Stream, tail: Tail)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Stopped reading codeql output");
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(&['\n', '\r'][..]);
        match stream {
            Stream::Stdout => info!(target: "codeql", "{}", line),
            Stream::Stderr => warn!(target: "codeql", "{}", line),
        }
        tail.push(line);
    }
}

async fn wait_for_deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}
