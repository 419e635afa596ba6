//! Bounded execution of external tools
//!
//! Every zfs/ssh invocation that is expected to terminate quickly goes through
//! [`run_with_timeout`], which captures stdout and stderr and enforces a hard
//! deadline. On timeout the child is killed and reaped so no zombie is left
//! behind. Long-running send/receive transfers are handled separately by the
//! transport pipe, which has no deadline.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use wait_timeout::ChildExt;

/// Captured output of a completed tool invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Exit code (0 = success); -1 if terminated by signal
    pub exit_code: i32,
}

impl CommandOutput {
    /// Returns true if the command succeeded (exit code 0)
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-empty stdout lines, in tool order
    pub fn stdout_lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string())
            .collect()
    }

    /// The captured diagnostic output, preferring stderr
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exit code {}", self.exit_code)
    }
}

/// Run a command to completion with a hard deadline
///
/// Returns `Ok(Some(output))` when the command finished in time (successfully
/// or not), `Ok(None)` when the deadline passed (the child has been killed and
/// reaped), and `Err` when the command could not be spawned or waited on.
pub fn run_with_timeout(
    cmd: &mut Command,
    timeout: Duration,
) -> std::io::Result<Option<CommandOutput>> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drain both pipes on their own threads so a chatty child can never block
    // on a full pipe buffer while we wait on it.
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    match child.wait_timeout(timeout)? {
        Some(status) => {
            let stdout = join_reader(stdout_reader);
            let stderr = join_reader(stderr_reader);
            Ok(Some(CommandOutput {
                stdout,
                stderr,
                exit_code: status.code().unwrap_or(-1),
            }))
        }
        None => {
            kill_and_reap(&mut child);
            // Readers finish once the kill closes the pipes.
            let _ = join_reader(stdout_reader);
            let _ = join_reader(stderr_reader);
            Ok(None)
        }
    }
}

/// Kill a child and wait for it so it does not linger as a zombie
pub fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

pub(crate) fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut r| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

pub(crate) fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
