//! Bounded process invocation.
//!
//! Runs a composed agent command to completion under a wall-clock budget,
//! draining both output pipes on reader threads so a chatty agent cannot
//! deadlock against a full pipe. The outcome distinguishes timeout from
//! nonzero exit: a timed-out agent may already have produced side effects,
//! and the caller reports that ambiguity instead of collapsing it into
//! plain failure.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use super::command::AgentInvocation;

/// Keep at most this much of each stream; the rest of the pipe is still
/// drained so the child never blocks on write.
const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// How often to poll the child for exit.
const WAIT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Exit code zero.
    Success,
    /// Nonzero exit code.
    Failed { code: i32 },
    /// Wall-clock budget elapsed; the process was killed. Side effects may
    /// have partially completed.
    TimedOut,
    /// The configured executable does not exist.
    NotFound,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Result of one invocation. Ephemeral: logged, used to decide ledger
/// updates, never persisted.
#[derive(Debug)]
pub struct InvocationResult {
    pub outcome: Outcome,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Run an invocation to completion or until `timeout` elapses.
///
/// A missing executable is classified as `Outcome::NotFound` rather than an
/// error so the poll loop can log a remediation hint and keep running; only
/// unexpected spawn failures surface as `Err`.
pub fn invoke(invocation: &AgentInvocation, timeout: Duration) -> Result<InvocationResult> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args);
    for (key, value) in &invocation.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &invocation.working_dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let start = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(InvocationResult {
                outcome: Outcome::NotFound,
                stdout: String::new(),
                stderr: String::new(),
                duration: start.elapsed(),
            });
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to spawn agent command: {}", invocation.program));
        }
    };

    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    loop {
        match child.try_wait().context("Failed to poll agent process")? {
            Some(status) => {
                let stdout = join_capture(stdout_reader);
                let stderr = join_capture(stderr_reader);
                let outcome = if status.success() {
                    Outcome::Success
                } else {
                    Outcome::Failed {
                        code: status.code().unwrap_or(-1),
                    }
                };
                return Ok(InvocationResult {
                    outcome,
                    stdout,
                    stderr,
                    duration: start.elapsed(),
                });
            }
            None => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait(); // reap; readers see EOF
                    return Ok(InvocationResult {
                        outcome: Outcome::TimedOut,
                        stdout: join_capture(stdout_reader),
                        stderr: join_capture(stderr_reader),
                        duration: start.elapsed(),
                    });
                }
                thread::sleep(WAIT_POLL);
            }
        }
    }
}

/// Drain a pipe to EOF on a background thread, keeping a bounded prefix.
fn drain<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut captured = Vec::new();
        let Some(mut stream) = stream else {
            return captured;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let room = MAX_CAPTURE_BYTES.saturating_sub(captured.len());
                    captured.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
        }
        captured
    })
}

/// Decode a captured stream defensively: undecodable bytes are replaced,
/// never fatal.
fn join_capture(handle: thread::JoinHandle<Vec<u8>>) -> String {
    let bytes = handle.join().unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// First `max_chars` of a stream for a log line.
pub fn excerpt(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
