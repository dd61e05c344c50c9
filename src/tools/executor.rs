//! Tool Executor
//!
//! Runs an argument vector as a subprocess with a hard timeout and captures
//! its output. The process is never started through a shell.

use serde::{Deserialize, Serialize};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};

/// Exit code reported when the timeout fires
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Maximum captured bytes per stream (10MB)
const MAX_OUTPUT_SIZE: usize = 10 * 1024 * 1024;

/// How long to wait for a killed child to be reaped
const KILL_GRACE: Duration = Duration::from_secs(5);

const TRUNCATION_MARKER: &str = "\n... [output truncated]";

/// Result of tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Process exit code; 124 on timeout, 128+N when killed by signal N
    pub exit_code: i32,

    /// Standard output (truncated if too large)
    pub stdout: String,

    /// Standard error (truncated if too large)
    pub stderr: String,

    /// Wall-clock duration in seconds, millisecond precision
    pub duration_seconds: f64,

    /// Tool name
    pub tool: String,

    /// Output format hint echoed from the request
    pub output_format: String,

    /// Whether execution hit the timeout
    #[serde(skip)]
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Create a timeout result
    fn timeout(timeout: Duration, elapsed: Duration) -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: format!("Command timed out after {} seconds", timeout.as_secs()),
            duration_seconds: round_millis(elapsed),
            tool: String::new(),
            output_format: String::new(),
            timed_out: true,
        }
    }

    /// Attach the tool name and output format
    pub fn labelled(mut self, tool: impl Into<String>, output_format: impl Into<String>) -> Self {
        self.tool = tool.into();
        self.output_format = output_format.into();
        self
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        if self.timed_out {
            format!("Timeout after {:.3}s", self.duration_seconds)
        } else {
            format!(
                "Exit code {} in {:.3}s ({} bytes output)",
                self.exit_code,
                self.duration_seconds,
                self.stdout.len() + self.stderr.len()
            )
        }
    }
}

/// Configuration for tool execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum captured bytes per stream (default: 10MB)
    pub max_output_size: usize,

    /// Working directory for command execution (default: current directory)
    pub working_dir: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_output_size: MAX_OUTPUT_SIZE,
            working_dir: None,
        }
    }
}

impl ExecutorConfig {
    /// Create a new executor config with custom output limit
    pub fn with_max_output_size(size: usize) -> Self {
        Self {
            max_output_size: size,
            ..Default::default()
        }
    }
}

/// Subprocess executor
///
/// # Security
///
/// 1. Uses `tokio::process::Command` directly, never a shell
/// 2. stdin is closed so tools cannot block on input
/// 3. Timeout kills and reaps the child
/// 4. Captured output is capped per stream
#[derive(Debug, Clone, Default)]
pub struct ToolExecutor {
    /// Executor configuration
    config: ExecutorConfig,
}

impl ToolExecutor {
    /// Create a new tool executor with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new tool executor with custom configuration
    pub fn with_config(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute `argv` and wait at most `timeout`
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] if the binary is not installed and
    /// [`GatewayError::Internal`] for any other spawn or wait failure. A
    /// timeout is not an error; it yields exit code 124.
    pub async fn execute(&self, argv: &[String], timeout: Duration) -> Result<ExecutionResult> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| GatewayError::validation("Empty command"))?;

        debug!(argv = ?argv, "spawning process");

        let mut process = TokioCommand::new(program);
        process
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        process.process_group(0);
        if let Some(ref dir) = self.config.working_dir {
            process.current_dir(dir);
        }

        let start = Instant::now();
        let mut child = process.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GatewayError::unavailable(format!("Tool '{}' not installed or not in PATH", program))
            } else {
                GatewayError::internal(format!("Execution error: {}", e))
            }
        })?;

        let pid = child.id();
        let limit = self.config.max_output_size;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        // One deadline covers the wait and the pipe drain: a background
        // grandchild holding stdout open must not outlive the timeout.
        let run = async {
            tokio::join!(
                child.wait(),
                read_stream(stdout_pipe, limit),
                read_stream(stderr_pipe, limit)
            )
        };

        let outcome = tokio::time::timeout(timeout, run).await;
        let (status, stdout, stderr) = match outcome {
            Ok((Ok(status), stdout, stderr)) => (status, stdout, stderr),
            Ok((Err(e), _, _)) => {
                return Err(GatewayError::internal(format!("Execution error: {}", e)));
            }
            Err(_) => {
                kill_process_group(pid);
                if let Err(e) = child.start_kill() {
                    debug!(program = %program, "kill after timeout: {}", e);
                }
                if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
                    warn!(program = %program, "timed out process was not reaped in time");
                }

                let result = ExecutionResult::timeout(timeout, start.elapsed());
                warn!(program = %program, timeout_secs = timeout.as_secs(), "command timed out");
                return Ok(result);
            }
        };
        let stdout = decode(stdout)?;
        let stderr = decode(stderr)?;
        let elapsed = start.elapsed();
        let exit_code = exit_code(status);

        info!(
            program = %program,
            exit_code,
            duration_ms = elapsed.as_millis() as u64,
            "command finished"
        );

        Ok(ExecutionResult {
            exit_code,
            stdout,
            stderr,
            duration_seconds: round_millis(elapsed),
            tool: String::new(),
            output_format: String::new(),
            timed_out: false,
        })
    }
}

type Captured = std::io::Result<(Vec<u8>, bool)>;

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>, limit: usize) -> Captured {
    match stream {
        Some(stream) => read_capped(stream, limit).await,
        None => Ok((Vec::new(), false)),
    }
}

/// Drain a stream completely, keeping at most `limit` bytes
///
/// The pipe must be drained even past the limit, or the child blocks on a
/// full pipe buffer and never exits.
async fn read_capped<R: AsyncRead + Unpin>(mut stream: R, limit: usize) -> Captured {
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        if n > room {
            truncated = true;
        }
        kept.extend_from_slice(&buf[..n.min(room)]);
    }

    Ok((kept, truncated))
}

fn decode(captured: Captured) -> Result<String> {
    let (mut bytes, truncated) =
        captured.map_err(|e| GatewayError::internal(format!("Failed to read output: {}", e)))?;

    if truncated {
        bytes.truncate(char_boundary(&bytes));
    }
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    Ok(text)
}

/// Length of `bytes` without a trailing partial UTF-8 sequence
fn char_boundary(bytes: &[u8]) -> usize {
    let len = bytes.len();
    let mut lead = len;
    while lead > 0 && len - lead < 4 && bytes[lead - 1] & 0xC0 == 0x80 {
        lead -= 1;
    }
    if lead == 0 {
        return len;
    }
    let width = match bytes[lead - 1] {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return len,
    };
    if len - (lead - 1) < width {
        lead - 1
    } else {
        len
    }
}

/// SIGKILL everything in the child's process group
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!(pgid = pid, "killpg failed: {}", e);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn round_millis(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0).round() / 1000.0
}
