//! Helpers for running child processes with an optional timeout and bounded output.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Extra time the output readers get after the deadline, to pick up what a killed child wrote.
const READER_GRACE: Duration = Duration::from_millis(250);

type ReaderHandle = thread::JoinHandle<Result<(Vec<u8>, usize)>>;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

/// Spawn `cmd` with stdin closed and stdout piped.
///
/// Stderr is piped when `capture_stderr` is set and sent to null otherwise.
/// Errors are returned unwrapped so callers can tell a launch failure apart
/// from failures while collecting output.
pub fn spawn_captured(mut cmd: Command, capture_stderr: bool) -> std::io::Result<Child> {
    cmd.stdin(Stdio::null()).stdout(Stdio::piped());
    if capture_stderr {
        cmd.stderr(Stdio::piped());
    } else {
        cmd.stderr(Stdio::null());
    }
    debug!("spawning child process");
    cmd.spawn()
}

/// Wait for `child` and collect its output without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
///
/// With a timeout, the deadline covers the readers too: a grandchild that inherited the pipes
/// and outlives the killed child cannot hold the call open. Such readers are abandoned, their
/// output is dropped and the result is marked `timed_out`. With `timeout = None` this blocks
/// until the child exits and its pipes close.
#[instrument(skip_all, fields(timeout_ms = timeout.map(|t| t.as_millis() as u64), output_limit_bytes))]
pub fn collect_output(
    mut child: Child,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child.stderr.take();

    let stdout_handle = thread::spawn(move || drain_limited(stdout, output_limit_bytes));
    let stderr_handle =
        stderr.map(|stream| thread::spawn(move || drain_limited(stream, output_limit_bytes)));

    let mut timed_out = false;
    let status = match timeout {
        None => child.wait().context("wait for command")?,
        Some(timeout) => match child.wait_timeout(timeout).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(timeout = ?timeout, "command timed out, killing");
                timed_out = true;
                child.kill().context("kill command")?;
                child.wait().context("wait command after kill")?
            }
        },
    };

    let reader_deadline = deadline.map(|d| d + READER_GRACE);
    let stdout = join_reader(stdout_handle, reader_deadline).context("join stdout")?;
    let stderr = match stderr_handle {
        Some(handle) => join_reader(handle, reader_deadline).context("join stderr")?,
        None => Some((Vec::new(), 0)),
    };
    let ((stdout, stdout_truncated), (stderr, stderr_truncated)) = match (stdout, stderr) {
        (Some(out), Some(err)) => (out, err),
        _ => {
            warn!("output pipes still open after deadline, abandoning readers");
            timed_out = true;
            ((Vec::new(), 0), (Vec::new(), 0))
        }
    };

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Join a reader thread, giving up at `deadline`. `Ok(None)` means the reader was abandoned.
fn join_reader(
    handle: ReaderHandle,
    deadline: Option<Instant>,
) -> Result<Option<(Vec<u8>, usize)>> {
    if let Some(deadline) = deadline {
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
        .map(Some)
}

/// Keep the first `limit` bytes of `reader`, then drain the rest and count it.
fn drain_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    (&mut reader)
        .take(limit as u64)
        .read_to_end(&mut kept)
        .context("read output")?;
    let discarded = std::io::copy(&mut reader, &mut std::io::sink()).context("drain output")?;
    Ok((kept, discarded as usize))
}
