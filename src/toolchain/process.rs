//! Child process execution with timeout and cancellation.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{PrecompileError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared flag that asks running toolchain processes to stop
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stdout followed by stderr, like a combined stream
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

/// Limits applied to every spawned process
#[derive(Debug, Clone, Default)]
pub struct ProcessLimits {
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

/// Spawn `cmd`, capture stdout and stderr separately, and wait for it.
///
/// The child is killed when the timeout elapses or the token is cancelled.
pub fn run_process(cmd: &mut Command, tool: &str, limits: &ProcessLimits) -> Result<ProcessOutput> {
    run_process_with_input(cmd, tool, limits, None)
}

/// Like [`run_process`], feeding `input` to the child's stdin.
///
/// On unix the child leads its own process group, and the whole group is
/// killed on timeout or cancellation. `go run` executes the compiled
/// program as a grandchild, which must not outlive the call.
pub fn run_process_with_input(
    cmd: &mut Command,
    tool: &str,
    limits: &ProcessLimits,
    input: Option<&[u8]>,
) -> Result<ProcessOutput> {
    debug!("Running tool: {:?}", cmd);

    if limits.cancel.is_cancelled() {
        return Err(PrecompileError::Cancelled {
            tool: tool.to_string(),
        });
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let stdin = if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    let mut child = cmd
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| PrecompileError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

    if let (Some(input), Some(mut writer)) = (input, child.stdin.take()) {
        let input = input.to_vec();
        // dropping the writer closes the pipe
        thread::spawn(move || {
            let _ = writer.write_all(&input);
        });
    }

    let stdout_rx = drain(child.stdout.take());
    let stderr_rx = drain(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                kill_tree(&mut child);
                return Err(PrecompileError::Spawn {
                    tool: tool.to_string(),
                    source,
                });
            }
        }

        if limits.cancel.is_cancelled() {
            warn!("Cancelling {}", tool);
            kill_tree(&mut child);
            return Err(PrecompileError::Cancelled {
                tool: tool.to_string(),
            });
        }

        if let Some(timeout) = limits.timeout {
            if start.elapsed() >= timeout {
                warn!("{} timed out after {:?}", tool, timeout);
                kill_tree(&mut child);
                return Err(PrecompileError::Timeout {
                    tool: tool.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
        }

        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_rx.recv_timeout(DRAIN_TIMEOUT).unwrap_or_default();
    let stderr = stderr_rx.recv_timeout(DRAIN_TIMEOUT).unwrap_or_default();

    Ok(ProcessOutput {
        status,
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
    })
}

/// Kill the child and, on unix, every process in its group
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: kill(2) with a negative pid only signals the group the
            // child leads; it touches no memory.
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buffer);
        }
        let _ = tx.send(buffer);
    });
    rx
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_streams_separately() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err 1>&2"]);

        let output = run_process(&mut cmd, "sh", &ProcessLimits::default()).unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.combined(), "out\nerr\n");
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let mut cmd = Command::new("false");
        let output = run_process(&mut cmd, "false", &ProcessLimits::default()).unwrap();
        assert!(!output.success());
    }

    #[test]
    fn test_timeout_kills_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let limits = ProcessLimits {
            timeout: Some(Duration::from_millis(100)),
            cancel: CancelToken::new(),
        };

        let start = Instant::now();
        let err = run_process(&mut cmd, "sleep", &limits).unwrap_err();

        assert!(matches!(err, PrecompileError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("survived");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(format!(
            "(sleep 1; touch {}) & wait",
            marker.display()
        ));
        let limits = ProcessLimits {
            timeout: Some(Duration::from_millis(200)),
            cancel: CancelToken::new(),
        };

        let err = run_process(&mut cmd, "sh", &limits).unwrap_err();
        assert!(matches!(err, PrecompileError::Timeout { .. }));

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists(), "background process outlived the timeout");
    }

    #[test]
    fn test_feeds_stdin() {
        let mut cmd = Command::new("cat");
        let input = b"piped\n".as_slice();
        let output = run_process_with_input(&mut cmd, "cat", &ProcessLimits::default(), Some(input))
            .unwrap();
        assert_eq!(output.stdout, "piped\n");
    }

    #[test]
    fn test_cancel_before_spawn() {
        let limits = ProcessLimits::default();
        limits.cancel.cancel();

        let mut cmd = Command::new("true");
        let err = run_process(&mut cmd, "true", &limits).unwrap_err();
        assert!(matches!(err, PrecompileError::Cancelled { .. }));
    }

    #[test]
    fn test_cancel_while_running() {
        let limits = ProcessLimits::default();
        let token = limits.cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            token.cancel();
        });

        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_process(&mut cmd, "sleep", &limits).unwrap_err();
        assert!(matches!(err, PrecompileError::Cancelled { .. }));
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let mut cmd = Command::new("definitely-not-a-real-binary-xyz");
        let err = run_process(&mut cmd, "xyz", &ProcessLimits::default()).unwrap_err();
        assert!(matches!(err, PrecompileError::Spawn { .. }));
    }
}
