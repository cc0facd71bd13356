//! Static-analysis scanner invocation
//!
//! The scanner is an external Bandit-compatible program invoked as
//! `<program> [prefix args] -r <target> -f json -o <report>`. The report is
//! written to a private scratch directory outside the sandbox root and parsed as a
//! [`ScanReport`]. The scanner's exit status is not trusted either way:
//! Bandit exits non-zero whenever it finds issues, so only the report
//! decides the outcome. A partial or malformed report is a total failure.
//!
//! Like shell commands, the scanner runs in its own process group and a
//! timeout kills the whole group.

use crate::error::SandboxError;
use crew_protocol::ScanReport;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Scanner front-end
#[derive(Debug, Clone)]
pub struct Scanner {
    program: String,
    prefix_args: Vec<String>,
    timeout: Duration,
}

impl Scanner {
    /// Create scanner from a command line such as `bandit` or
    /// `python3 -m bandit`; extra words are passed before the scan arguments
    #[must_use]
    pub fn new(command_line: &str, timeout: Duration) -> Self {
        let mut words = command_line.split_whitespace().map(str::to_string);
        Self {
            program: words.next().unwrap_or_default(),
            prefix_args: words.collect(),
            timeout,
        }
    }

    /// Scanner executable
    #[inline]
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Scan an already-resolved target
    ///
    /// # Errors
    /// Returns `ScanFailure` if the scanner cannot run, times out, writes no
    /// report, or writes a report that does not parse
    pub async fn scan(&self, target: &Path) -> Result<ScanReport, SandboxError> {
        let scratch = tempfile::Builder::new()
            .prefix("crew-scan-")
            .tempdir()
            .map_err(|e| SandboxError::ScanFailure(format!("no scratch space: {e}")))?;
        let report_path = scratch.path().join("report.json");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .arg("-r")
            .arg(target)
            .arg("-f")
            .arg("json")
            .arg("-o")
            .arg(&report_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        tracing::info!(program = %self.program, target = %target.display(), "starting scan");
        let child = cmd.spawn().map_err(|e| {
            SandboxError::ScanFailure(format!("failed to run {}: {e}", self.program))
        })?;
        let pid = child.id();
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(SandboxError::ScanFailure(format!(
                    "failed to wait for {}: {e}",
                    self.program
                )))
            }
            Err(_) => {
                tracing::warn!(program = %self.program, "scan timed out, killing process group");
                crate::exec::kill_process_group(pid);
                return Err(SandboxError::ScanFailure(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                )))
            }
        };

        let bytes = tokio::fs::read(&report_path).await.map_err(|_| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            SandboxError::ScanFailure(format!(
                "{} wrote no report (status {}): {}",
                self.program,
                output.status,
                crate::exec::truncate_chars(stderr.trim(), 400)
            ))
        })?;

        let report = ScanReport::from_slice(&bytes)
            .map_err(|e| SandboxError::ScanFailure(format!("unparseable report: {e}")))?;
        tracing::info!(findings = report.results.len(), "scan finished");
        Ok(report)
    }
}
