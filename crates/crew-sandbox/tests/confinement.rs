//! Functional tests for the sandboxed tool service.
//!
//! These exercise the service through its public API the way the HTTP layer
//! does, focusing on the guarantees callers rely on:
//! - No operation leaves the root, and a rejected request has no side effects
//! - Timed-out commands leave no process behind
//! - Sessions sharing one root stay invisible to each other

use crew_sandbox::{SandboxConfig, SandboxError, ToolService};
use std::path::Path;
use std::time::{Duration, Instant};

fn make_service(dir: &Path) -> ToolService {
    ToolService::new(SandboxConfig::new(dir.join("code"))).unwrap()
}

/// Every operation rejects escaping paths with PathEscape and performs
/// no filesystem mutation or process spawn.
#[tokio::test]
async fn escapes_are_rejected_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let service = make_service(dir.path());
    let outside = dir.path().join("outside");
    std::fs::create_dir_all(&outside).unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink(&outside, service.root().path().join("door")).unwrap();

    let mut escapes = vec!["../../etc/passwd".to_string(), "/etc".to_string(), "..".to_string()];
    if cfg!(unix) {
        escapes.push("door".to_string());
        escapes.push("door/planted.txt".to_string());
    }

    for path in &escapes {
        assert!(matches!(service.read(path).await, Err(SandboxError::PathEscape(_))), "read {path}");
        assert!(matches!(service.list(path).await, Err(SandboxError::PathEscape(_))), "list {path}");
        assert!(matches!(service.scan(path).await, Err(SandboxError::PathEscape(_))), "scan {path}");
        assert!(
            matches!(service.write(path, "x").await, Err(SandboxError::PathEscape(_))),
            "write {path}"
        );

        let marker = outside.join("spawned");
        let command = format!("touch {}", marker.display());
        assert!(
            matches!(service.execute(&command, path, None).await, Err(SandboxError::PathEscape(_))),
            "execute in {path}"
        );
        assert!(!marker.exists(), "command ran for workdir {path}");
    }

    assert_eq!(std::fs::read_dir(&outside).unwrap().count(), 0);
}

/// Writing to the root itself is refused and stages nothing beside the root.
#[tokio::test]
async fn writing_the_root_itself_touches_nothing_outside() {
    let dir = tempfile::tempdir().unwrap();
    let service = make_service(dir.path());
    #[cfg(unix)]
    std::os::unix::fs::symlink(service.root().path(), service.root().path().join("self")).unwrap();

    let mut targets = vec![".", "", "./", "sub/.."];
    if cfg!(unix) {
        targets.push("self");
    }
    for path in targets {
        assert!(
            matches!(service.write(path, "x".repeat(4096)).await, Err(SandboxError::PathEscape(_))),
            "write {path:?}"
        );
    }

    let beside_root: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(beside_root, vec!["code".to_string()]);
}

/// Write followed by read returns exactly what was written.
#[tokio::test]
async fn write_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let service = make_service(dir.path());
    let content = "def add(a, b):\n    return a + b\n\n# ünïcödé ✓\n";

    service.write("ab12cd34/snippet.py", content).await.unwrap();
    assert_eq!(service.read("ab12cd34/snippet.py").await.unwrap(), content);
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    // Zombies awaiting reaping by init count as dead.
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z"),
        Err(_) => false,
    }
}

/// A timed-out command fails with TimedOut within a grace period and
/// nothing it started survives.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn timeout_leaves_no_orphans() {
    let dir = tempfile::tempdir().unwrap();
    let service = make_service(dir.path());
    service.write("t/.keep", "").await.unwrap();

    let started = Instant::now();
    let err = service
        .execute("sleep 60 & echo $! > bg.pid; wait", "t", Some(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::TimedOut { .. }));
    assert!(started.elapsed() < Duration::from_secs(4));

    let pid: u32 = service.read("t/bg.pid").await.unwrap().trim().parse().unwrap();
    let deadline = Instant::now() + Duration::from_secs(3);
    while process_alive(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!process_alive(pid), "background process {pid} survived the timeout");
}

/// Non-zero exits return the exit code and output truncated to the
/// configured bound.
#[tokio::test]
async fn nonzero_exit_is_truncated_to_bound() {
    let dir = tempfile::tempdir().unwrap();
    let service = ToolService::new(
        SandboxConfig::new(dir.path().join("code")).with_failure_output_limit(400),
    )
    .unwrap();

    let response = service
        .execute("i=0; while [ $i -lt 100 ]; do printf 0123456789; i=$((i+1)); done; exit 7", ".", None)
        .await
        .unwrap();
    assert_eq!(response.exit, Some(7));
    assert_eq!(response.output.len(), 400);
    assert!(response.output.starts_with("0123456789"));
}

/// Concurrent sessions writing under their own prefixes never see
/// each other's files.
#[tokio::test]
async fn concurrent_sessions_are_partitioned() {
    let dir = tempfile::tempdir().unwrap();
    let service = make_service(dir.path());

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let session = format!("session{i}");
            for j in 0..5 {
                service
                    .write(&format!("{session}/file{j}.py"), format!("# {session}"))
                    .await
                    .unwrap();
            }
            let entries = service.list(&session).await.unwrap();
            (session, entries)
        }));
    }

    for handle in handles {
        let (session, entries) = handle.await.unwrap();
        assert_eq!(
            entries,
            (0..5).map(|j| format!("file{j}.py")).collect::<Vec<_>>(),
            "{session} saw foreign entries"
        );
    }
}
