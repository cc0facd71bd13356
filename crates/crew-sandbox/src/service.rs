//! Tool service
//!
//! Facade over the sandbox primitives. Every operation resolves its path
//! through [`SandboxRoot::resolve`] first; nothing touches the filesystem
//! or spawns a process until that succeeds.
//!
//! The service holds no session affinity. Concurrent callers are isolated
//! by path (each session writes under its own directory) and every command
//! runs in its own child process.

use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::exec::{self, CommandOutput};
use crate::root::SandboxRoot;
use crate::scan::Scanner;
use crew_protocol::{ExecResponse, ScanReport};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
struct Inner {
    root: SandboxRoot,
    config: SandboxConfig,
    scanner: Scanner,
}

/// Sandboxed tool service (cheap to clone)
#[derive(Debug, Clone)]
pub struct ToolService {
    inner: Arc<Inner>,
}

impl ToolService {
    /// Create service, creating the root directory if needed
    ///
    /// # Errors
    /// Returns `Io` if the root cannot be created or canonicalized
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        let root = SandboxRoot::open(&config.root)?;
        let scanner = Scanner::new(&config.scanner_command, config.scan_timeout);
        tracing::info!(root = %root.path().display(), "tool service ready");
        Ok(Self {
            inner: Arc::new(Inner {
                root,
                config,
                scanner,
            }),
        })
    }

    /// Sandbox root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &SandboxRoot {
        &self.inner.root
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.inner.config
    }

    /// Read a file, replacing invalid UTF-8 sequences
    ///
    /// # Errors
    /// `PathEscape`, `NotFound`, or `Io`
    pub async fn read(&self, path: &str) -> Result<String, SandboxError> {
        let target = self.inner.root.resolve(path)?;
        let bytes = tokio::fs::read(&target)
            .await
            .map_err(|e| SandboxError::io(path, e))?;
        tracing::debug!(path, bytes = bytes.len(), "read file");
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Replace a file's content, creating parent directories
    ///
    /// The content goes to a sibling temporary file first and is renamed
    /// over the target, so readers never see a half-written file.
    ///
    /// The root itself is not a writable file: its parent lies outside the
    /// sandbox, so it is refused as an escape before any I/O.
    ///
    /// # Errors
    /// `PathEscape` or `Io`
    pub async fn write(&self, path: &str, content: impl AsRef<[u8]>) -> Result<(), SandboxError> {
        let target = self.inner.root.resolve(path)?;
        let (Some(parent), Some(name)) = (target.parent(), target.file_name()) else {
            return Err(SandboxError::PathEscape(path.to_string()));
        };
        if !parent.starts_with(self.inner.root.path()) {
            return Err(SandboxError::PathEscape(path.to_string()));
        }

        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SandboxError::io(path, e))?;

        let staging = parent.join(format!(
            ".{}.{}.tmp",
            name.to_string_lossy(),
            Uuid::new_v4().simple()
        ));
        let content = content.as_ref();
        if let Err(e) = tokio::fs::write(&staging, content).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(SandboxError::io(path, e));
        }
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(SandboxError::io(path, e));
        }

        tracing::debug!(path, bytes = content.len(), "wrote file");
        Ok(())
    }

    /// Sorted names of a directory's immediate entries
    ///
    /// # Errors
    /// `PathEscape`, `NotFound`, or `Io`
    pub async fn list(&self, path: &str) -> Result<Vec<String>, SandboxError> {
        let target = self.inner.root.resolve(path)?;
        let mut dir = tokio::fs::read_dir(&target)
            .await
            .map_err(|e| SandboxError::io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| SandboxError::io(path, e))?
        {
            entries.push(entry.file_name().to_string_lossy().into_owned());
        }
        entries.sort();
        Ok(entries)
    }

    /// Run a shell command in `workdir`
    ///
    /// `timeout_secs` falls back to the configured default and is capped by
    /// the configured maximum.
    ///
    /// # Errors
    /// `PathEscape`, `NotFound` (missing workdir), `Spawn`, or `TimedOut`
    pub async fn run(
        &self,
        command: &str,
        workdir: &str,
        timeout_secs: Option<u64>,
    ) -> Result<CommandOutput, SandboxError> {
        let dir = self.inner.root.resolve(workdir)?;
        if !is_dir(&dir).await {
            return Err(SandboxError::NotFound(workdir.to_string()));
        }

        let timeout = self.inner.config.effective_timeout(timeout_secs);
        tracing::info!(command, workdir, timeout_secs = timeout.as_secs(), "executing command");
        let output =
            exec::run_shell(command, &dir, timeout, self.inner.config.capture_limit).await?;
        tracing::info!(command, exit_code = output.exit_code, "command finished");
        Ok(output)
    }

    /// Run a shell command and shape the result for the wire
    ///
    /// Non-zero exits are not errors: they come back with the exit code and
    /// output truncated to the configured bound.
    ///
    /// # Errors
    /// Same as [`ToolService::run`]
    pub async fn execute(
        &self,
        command: &str,
        workdir: &str,
        timeout_secs: Option<u64>,
    ) -> Result<ExecResponse, SandboxError> {
        let output = self.run(command, workdir, timeout_secs).await?;
        if output.success() {
            Ok(ExecResponse {
                exit: None,
                output: output.output,
            })
        } else {
            Ok(ExecResponse {
                exit: Some(output.exit_code),
                output: exec::truncate_chars(&output.output, self.inner.config.failure_output_limit),
            })
        }
    }

    /// Run the static-analysis scanner over a path
    ///
    /// # Errors
    /// `PathEscape`, `NotFound`, or `ScanFailure`
    pub async fn scan(&self, path: &str) -> Result<ScanReport, SandboxError> {
        let target = self.inner.root.resolve(path)?;
        if tokio::fs::metadata(&target).await.is_err() {
            return Err(SandboxError::NotFound(path.to_string()));
        }
        self.inner.scanner.scan(&target).await
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn service() -> (tempfile::TempDir, ToolService) {
        let dir = tempfile::tempdir().unwrap();
        let service = ToolService::new(SandboxConfig::new(dir.path().join("code"))).unwrap();
        (dir, service)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_dir, service) = service();
        service.write("s1/snippet.py", "print('hi')\n").await.unwrap();
        assert_eq!(service.read("s1/snippet.py").await.unwrap(), "print('hi')\n");

        service.write("s1/snippet.py", "x = 1\n").await.unwrap();
        assert_eq!(service.read("s1/snippet.py").await.unwrap(), "x = 1\n");
    }

    #[tokio::test]
    async fn invalid_utf8_degrades_gracefully() {
        let (_dir, service) = service();
        service.write("bin.txt", [b'o', b'k', 0xff, 0xfe, b'!']).await.unwrap();
        let content = service.read("bin.txt").await.unwrap();
        assert!(content.starts_with("ok"));
        assert!(content.ends_with('!'));
        assert!(content.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_dir, service) = service();
        assert!(matches!(
            service.read("nope.txt").await,
            Err(SandboxError::NotFound(_))
        ));
        assert!(matches!(
            service.list("nope").await,
            Err(SandboxError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_is_sorted_and_leaves_no_staging_files() {
        let (_dir, service) = service();
        for name in ["b.py", "a.py", "c/d.py"] {
            service.write(name, "").await.unwrap();
        }
        assert_eq!(service.list(".").await.unwrap(), vec!["a.py", "b.py", "c"]);
    }

    #[tokio::test]
    async fn escaping_write_creates_nothing() {
        let (dir, service) = service();
        let err = service.write("../evil/x.txt", "pwned").await.unwrap_err();
        assert!(matches!(err, SandboxError::PathEscape(_)));
        assert!(!dir.path().join("evil").exists());
    }

    #[tokio::test]
    async fn escaping_workdir_spawns_nothing() {
        let (dir, service) = service();
        let marker = dir.path().join("spawned");
        let command = format!("touch {}", marker.display());
        let err = service.execute(&command, "..", None).await.unwrap_err();
        assert!(matches!(err, SandboxError::PathEscape(_)));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn nonzero_exit_truncates_output() {
        let (_dir, service) = service();
        let response = service
            .execute("head -c 1000 /dev/zero | tr '\\0' a; exit 4", ".", None)
            .await
            .unwrap();
        assert_eq!(response.exit, Some(4));
        assert_eq!(response.output.chars().count(), 400);
    }

    #[tokio::test]
    async fn success_keeps_full_output() {
        let (_dir, service) = service();
        let response = service
            .execute("head -c 1000 /dev/zero | tr '\\0' a", ".", None)
            .await
            .unwrap();
        assert!(response.succeeded());
        assert_eq!(response.output.len(), 1000);
    }

    #[tokio::test]
    async fn missing_workdir_is_not_found() {
        let (_dir, service) = service();
        assert!(matches!(
            service.execute("true", "missing", None).await,
            Err(SandboxError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn scan_of_missing_path_is_not_found() {
        let (_dir, service) = service();
        assert!(matches!(
            service.scan("missing.py").await,
            Err(SandboxError::NotFound(_))
        ));
    }
}
