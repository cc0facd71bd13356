//! Shell command execution
//!
//! Commands run as `sh -c <command>` in their own process group so a timeout
//! can take down everything the command started. Stdout and stderr are read
//! concurrently into one buffer in arrival order; the buffer stops growing
//! at its limit but both pipes keep being drained so the child never blocks
//! on a full pipe.

use crate::error::SandboxError;
use parking_lot::Mutex;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Result of a command that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `128 + signal` when the command was killed by a signal
    pub exit_code: i32,
    /// Combined stdout/stderr, lossily decoded
    pub output: String,
    /// Whether bytes were dropped at the capture limit
    pub capped: bool,
}

impl CommandOutput {
    /// Whether the command exited zero
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Bounded sink shared by the stdout and stderr readers
struct CaptureBuffer {
    bytes: Mutex<Vec<u8>>,
    limit: usize,
    capped: Mutex<bool>,
}

impl CaptureBuffer {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Mutex::new(Vec::new()),
            limit,
            capped: Mutex::new(false),
        }
    }

    fn extend(&self, chunk: &[u8]) {
        let mut bytes = self.bytes.lock();
        let room = self.limit.saturating_sub(bytes.len());
        if chunk.len() > room {
            *self.capped.lock() = true;
        }
        bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn into_parts(self) -> (String, bool) {
        let bytes = self.bytes.into_inner();
        (
            String::from_utf8_lossy(&bytes).into_owned(),
            self.capped.into_inner(),
        )
    }
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>, sink: &CaptureBuffer) {
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink.extend(&chunk[..n]),
        }
    }
}

/// Run `command` through `sh -c` in `workdir`
///
/// # Errors
/// - `Spawn` if the shell cannot be started
/// - `TimedOut` if the command outlives `timeout`; its process group is
///   killed and the child reaped before returning
pub async fn run_shell(
    command: &str,
    workdir: &Path,
    timeout: Duration,
    capture_limit: usize,
) -> Result<CommandOutput, SandboxError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
        command: command.to_string(),
        source,
    })?;
    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let buffer = CaptureBuffer::new(capture_limit);

    let finished = tokio::time::timeout(timeout, async {
        let ((), (), status) = tokio::join!(
            drain(stdout, &buffer),
            drain(stderr, &buffer),
            child.wait()
        );
        status
    })
    .await;

    let status = match finished {
        Ok(status) => status.map_err(|e| SandboxError::io(workdir.display().to_string(), e))?,
        Err(_) => {
            tracing::warn!(command, timeout_secs = timeout.as_secs(), "command timed out, killing process group");
            kill_process_group(pid);
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(SandboxError::TimedOut {
                command: command.to_string(),
                timeout,
            });
        }
    };

    let (output, capped) = buffer.into_parts();
    Ok(CommandOutput {
        exit_code: exit_code(status),
        output,
        capped,
    })
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt as _;
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(unix)]
pub(crate) fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::debug!(pid, %err, "killpg failed");
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_process_group(_pid: Option<u32>) {}

/// Keep the first `limit` characters of `text`
#[must_use]
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
