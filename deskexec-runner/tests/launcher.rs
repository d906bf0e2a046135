//! End-to-end launches against real processes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use assert_fs::TempDir;
use assert_fs::prelude::*;
use deskexec_runner::{
    AllowListPolicy, ChildTerminator, CommandRequest, ExecError, ExecutionCleanup, ExecutionId,
    ExecutionInfo, ExecutionRecord, Launcher, Outcome, ProcessRegistry, ProjectRoot, Trailer,
    output_channel,
};
use futures::StreamExt;
use pretty_assertions::assert_eq;

const DEADLINE: Duration = Duration::from_secs(10);

fn launcher(root: &Path, allowed: &[&str]) -> Launcher {
    Launcher::new(
        Arc::new(AllowListPolicy::new(allowed.iter().copied())),
        ProjectRoot::new(root),
    )
}

async fn collect(launched: deskexec_runner::Launched) -> String {
    let bytes = tokio::time::timeout(DEADLINE, launched.stream.collect_bytes())
        .await
        .expect("stream should finish before the deadline");
    String::from_utf8(bytes).expect("utf-8 output")
}

async fn wait_until_empty(registry: &ProcessRegistry) {
    let waited = tokio::time::timeout(DEADLINE, async {
        while !registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "registry still holds {:?}", registry.list());
}

#[tokio::test]
async fn pwd_in_project_root_reports_root_and_exit_code() {
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["pwd"]);

    let launched = launcher.launch(&CommandRequest::new("pwd")).await.unwrap();
    let output = collect(launched).await;

    let expected = format!(
        "{}\n\nProcess exited with code 0\n",
        launcher.project_root().path().display()
    );
    assert_eq!(output, expected);
    assert!(launcher.registry().is_empty());
}

#[tokio::test]
async fn runs_in_requested_subdirectory() {
    let temp = TempDir::new().unwrap();
    temp.child("src/notes.txt").write_str("hello\n").unwrap();
    let launcher = launcher(temp.path(), &["cat"]);

    let request = CommandRequest::new("cat notes.txt").with_cwd("src");
    let output = collect(launcher.launch(&request).await.unwrap()).await;

    assert_eq!(output, "hello\n\nProcess exited with code 0\n");
}

#[tokio::test]
async fn stderr_and_nonzero_exit_are_reported() {
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["cat"]);

    let request = CommandRequest::new("cat definitely-missing-file");
    let output = collect(launcher.launch(&request).await.unwrap()).await;

    assert!(output.contains("definitely-missing-file"), "{output}");
    assert!(output.ends_with("\nProcess exited with code 1\n"), "{output}");
}

#[tokio::test]
async fn disallowed_command_is_rejected_before_spawning() {
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["ls", "pwd"]);

    let err = launcher
        .launch(&CommandRequest::new("rm -rf /"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::InvalidCommand(_)));
    assert!(err.to_string().starts_with("\"rm\" is not permitted"));
    assert!(launcher.registry().is_empty());
}

#[tokio::test]
async fn shell_metacharacters_are_rejected() {
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["ls", "echo"]);

    let err = launcher
        .launch(&CommandRequest::new("ls; echo hacked"))
        .await
        .unwrap_err();
    assert!(err.is_rejection());
    assert!(err.to_string().contains("forbidden"));
}

#[tokio::test]
async fn escaping_working_directory_is_rejected() {
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["ls"]);

    let request = CommandRequest::new("ls").with_cwd("../..");
    let err = launcher.launch(&request).await.unwrap_err();
    assert!(matches!(err, ExecError::PathEscape { .. }), "{err:?}");
}

#[tokio::test]
async fn missing_binary_surfaces_in_stream() {
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["deskexec-missing-tool"]);

    let launched = launcher
        .launch(&CommandRequest::new("deskexec-missing-tool --version"))
        .await
        .unwrap();
    let id = launched.id.clone();
    let output = collect(launched).await;

    assert!(output.starts_with("\nError: "), "{output}");
    assert!(output.contains("deskexec-missing-tool"));
    assert!(launcher.registry().is_empty());
    assert!(matches!(
        launcher.registry().cancel(&id),
        Err(ExecError::NotFound(_))
    ));
}

#[tokio::test]
async fn missing_working_directory_surfaces_in_stream() {
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["ls"]);

    let request = CommandRequest::new("ls").with_cwd("not-created-yet");
    let output = collect(launcher.launch(&request).await.unwrap()).await;

    assert!(output.starts_with("\nError: "), "{output}");
    assert!(output.contains("does not exist"), "{output}");
}

#[cfg(unix)]
#[tokio::test]
async fn unattended_command_is_killed_at_timeout() {
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["sleep"])
        .with_timeout(Some(Duration::from_millis(300)))
        .with_kill_grace(Duration::from_millis(100));

    let started = std::time::Instant::now();
    let output = collect(launcher.launch(&CommandRequest::new("sleep 30")).await.unwrap()).await;

    // SIGTERM: 128 + 15
    assert_eq!(output, "\nProcess exited with code 143\n");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(launcher.registry().is_empty());
}

#[tokio::test]
async fn cancel_succeeds_once_and_ends_stream() {
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["sleep"]);

    let launched = launcher
        .launch(&CommandRequest::new("sleep 30"))
        .await
        .unwrap();
    let id = launched.id.clone();

    let info = launcher.registry().lookup(&id).expect("registered while running");
    assert_eq!(info.command, "sleep 30");
    assert!(info.pid.is_some());

    assert!(launcher.registry().cancel(&id).is_ok());
    match launcher.registry().cancel(&id) {
        Err(ExecError::NotFound(missing)) => assert_eq!(missing, id),
        other => panic!("expected NotFound, got {other:?}"),
    }

    let output = collect(launched).await;
    assert_eq!(output, "\nCommand cancelled\n");
    assert!(launcher.registry().is_empty());
}

/// `setsid` forks when called by a group leader, so the launched process
/// exits at once while a detached `sleep` keeps its stdout open.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn cancel_after_exit_with_open_pipes_reports_cancelled() {
    if !["/usr/bin/setsid", "/bin/setsid"]
        .iter()
        .any(|path| Path::new(path).exists())
    {
        eprintln!("setsid not installed; skipping");
        return;
    }
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["setsid"]);

    let launched = launcher
        .launch(&CommandRequest::new("setsid sleep 3"))
        .await
        .unwrap();
    let id = launched.id.clone();
    let pid = launcher
        .registry()
        .lookup(&id)
        .and_then(|info| info.pid)
        .expect("registered with a pid");

    let group = deskexec_runner::ProcessGroup::new(pid);
    let exited = tokio::time::timeout(DEADLINE, async {
        while group.is_alive() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(exited.is_ok(), "launched process never exited");
    assert!(
        launcher.registry().contains(&id),
        "entry must stay while output is still open"
    );

    assert!(launcher.registry().cancel(&id).is_ok());
    let output = collect(launched).await;
    assert_eq!(output, "\nCommand cancelled\n");
    assert!(launcher.registry().is_empty());
}

#[tokio::test]
async fn dropping_the_stream_kills_and_evicts() {
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["sleep"]);

    let launched = launcher
        .launch(&CommandRequest::new("sleep 30"))
        .await
        .unwrap();
    assert_eq!(launcher.registry().len(), 1);

    drop(launched);
    wait_until_empty(launcher.registry()).await;
}

#[tokio::test]
async fn concurrent_launches_keep_separate_streams() {
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["echo"]);

    let mut launches = Vec::new();
    for n in 0..8 {
        let launched = launcher
            .launch(&CommandRequest::new(format!("echo run-{n}")))
            .await
            .unwrap();
        launches.push((n, launched));
    }

    let mut ids: Vec<ExecutionId> = launches.iter().map(|(_, l)| l.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);

    let outputs = futures::future::join_all(
        launches
            .into_iter()
            .map(|(n, launched)| async move { (n, collect(launched).await) }),
    )
    .await;
    for (n, output) in outputs {
        assert_eq!(output, format!("run-{n}\n\nProcess exited with code 0\n"));
    }
    assert!(launcher.registry().is_empty());
}

#[tokio::test]
async fn list_shows_running_commands() {
    let temp = TempDir::new().unwrap();
    let launcher = launcher(temp.path(), &["sleep"]);

    let first = launcher.launch(&CommandRequest::new("sleep 20")).await.unwrap();
    let second = launcher.launch(&CommandRequest::new("sleep 21")).await.unwrap();

    let listed = launcher.registry().list();
    let mut commands: Vec<&str> = listed.iter().map(|info| info.command.as_str()).collect();
    commands.sort_unstable();
    assert_eq!(commands, vec!["sleep 20", "sleep 21"]);

    assert_eq!(launcher.registry().terminate_all(), 2);
    for launched in [first, second] {
        let output = collect(launched).await;
        assert!(output.starts_with("\nProcess exited with code "), "{output}");
    }
}

struct NoopTerminator;

impl ChildTerminator for NoopTerminator {
    fn terminate(&self) {}
    fn kill(&self) {}
}

#[tokio::test]
async fn cleanup_twice_closes_and_evicts_once() {
    let registry = ProcessRegistry::new();
    let id = ExecutionId::generate();
    let (cancel_tx, _cancel_rx) = tokio::sync::oneshot::channel();
    registry.insert(ExecutionRecord::new(
        ExecutionInfo::new(id.clone(), "sleep 1", std::env::temp_dir(), None),
        Arc::new(NoopTerminator),
        cancel_tx,
    ));

    let (sink, mut stream) = output_channel(4);
    let mut cleanup = ExecutionCleanup::new(id.clone(), registry.clone(), sink);

    // A natural exit followed by a late timeout.
    assert!(cleanup.finish(&Outcome::Finished(Trailer::Exited(0))).await);
    assert!(!cleanup.finish(&Outcome::Finished(Trailer::Cancelled)).await);
    assert!(!cleanup.finish(&Outcome::Detached).await);
    assert!(!registry.expire(&id));
    assert!(registry.is_empty());

    assert_eq!(
        stream.next().await.as_deref(),
        Some(&b"\nProcess exited with code 0\n"[..])
    );
    assert_eq!(stream.next().await, None);
}
