//! External tool execution with a watchdog timeout.
//!
//! The external tools occasionally hang on malformed input; every
//! invocation polls the child under a deadline and kills it on expiry so
//! a wedged tool costs at most one timeout period.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::error::InspectError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured output of a finished tool invocation.
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs a command to completion, killing it if it outlives `timeout`.
///
/// stdout and stderr are drained on separate threads so a chatty child
/// cannot deadlock on a full pipe while we wait for it.
pub fn run_tool(
    cmd: &mut Command,
    tool: &'static str,
    timeout: Duration,
) -> Result<ToolOutput, InspectError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| InspectError::ToolSpawn { tool, source: e })?;

    let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
    let stdout_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        buf
    });
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    log::warn!("{} exceeded {}s timeout, killing it", tool, timeout.as_secs());
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(InspectError::ToolTimeout {
                        tool,
                        secs: timeout.as_secs(),
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(InspectError::ToolSpawn { tool, source: e });
            }
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(ToolOutput {
        status,
        stdout,
        stderr,
    })
}

/// Runs a command and requires a zero exit status.
pub fn run_tool_checked(
    cmd: &mut Command,
    tool: &'static str,
    timeout: Duration,
) -> Result<ToolOutput, InspectError> {
    let output = run_tool(cmd, tool, timeout)?;
    if !output.status.success() {
        return Err(InspectError::ToolFailed {
            tool,
            status: output.status.to_string(),
            stderr: output.stderr_lossy().trim().to_string(),
        });
    }
    Ok(output)
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout_and_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2"]);
        let output = run_tool_checked(&mut cmd, "sh", Duration::from_secs(5)).unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(output.stderr_lossy().trim(), "err");
    }

    #[test]
    fn test_nonzero_exit_is_tool_failed() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo broken >&2; exit 3"]);
        let result = run_tool_checked(&mut cmd, "sh", Duration::from_secs(5));
        match result {
            Err(InspectError::ToolFailed { stderr, .. }) => assert_eq!(stderr, "broken"),
            other => panic!("expected ToolFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_hung_tool_is_killed() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let start = Instant::now();
        let result = run_tool(&mut cmd, "sleep", Duration::from_millis(200));
        assert!(matches!(result, Err(InspectError::ToolTimeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let mut cmd = Command::new("/nonexistent/definitely-not-a-tool");
        let result = run_tool(&mut cmd, "ffprobe", Duration::from_secs(1));
        assert!(matches!(result, Err(InspectError::ToolSpawn { .. })));
    }
}
