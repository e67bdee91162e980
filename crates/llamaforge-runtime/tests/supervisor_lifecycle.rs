//! End-to-end lifecycle tests against fake server executables.

#![cfg(unix)]

use llamaforge_core::{ModelRef, ServerConfig, SupervisorError, SupervisorState};
use llamaforge_runtime::{LogStreamEvent, Supervisor};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Write an executable shell script standing in for llama-server.
fn fake_server(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("llama-server");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn config_for(executable: PathBuf) -> ServerConfig {
    ServerConfig::new(ModelRef::Local("/models/test.gguf".into())).with_executable(executable)
}

#[tokio::test]
async fn stop_on_idle_supervisor_is_noop_success() {
    let supervisor = Supervisor::new();
    assert_eq!(supervisor.stop().await, Ok(()));
    assert_eq!(supervisor.status().await.state, SupervisorState::Idle);
}

#[tokio::test]
async fn start_while_running_is_rejected_and_keeps_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_server(&dir, "while true; do sleep 0.1; done");
    let config = config_for(exe);

    let supervisor = Supervisor::new();
    let outcome = supervisor.start(&config).await.unwrap();

    let second = supervisor.start(&config).await;
    assert_eq!(second.unwrap_err(), SupervisorError::AlreadyRunning);

    // The original managed process must be untouched
    let status = supervisor.status().await;
    assert_eq!(status.state, SupervisorState::Running);
    assert_eq!(status.pid, Some(outcome.pid));

    supervisor.stop().await.unwrap();
    assert_eq!(supervisor.status().await.state, SupervisorState::Idle);
}

#[tokio::test]
async fn start_with_empty_model_is_rejected_before_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_server(&dir, "exit 0");
    let config = config_for(exe);
    let config = ServerConfig {
        model: ModelRef::Local(PathBuf::new()),
        ..config
    };

    let supervisor = Supervisor::new();
    let result = supervisor.start(&config).await;
    assert_eq!(result.unwrap_err(), SupervisorError::MissingModel);
    assert_eq!(supervisor.status().await.state, SupervisorState::Idle);
}

#[tokio::test]
async fn spawn_failure_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    // Exists but is not executable
    let exe = dir.path().join("llama-server");
    std::fs::write(&exe, "not a binary").unwrap();

    let supervisor = Supervisor::new();
    let result = supervisor.start(&config_for(exe)).await;
    assert!(matches!(result, Err(SupervisorError::SpawnFailed(_))));
    assert_eq!(supervisor.status().await.state, SupervisorState::Idle);
}

#[tokio::test]
async fn crash_is_detected_lazily_on_status() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_server(&dir, "exit 1");
    let supervisor = Supervisor::new();

    supervisor.start(&config_for(exe)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let status = supervisor.status().await;
    assert_eq!(status.state, SupervisorState::Crashed);
    assert_eq!(status.pid, None);

    // stop() from Crashed clears back to Idle
    supervisor.stop().await.unwrap();
    assert_eq!(supervisor.status().await.state, SupervisorState::Idle);
}

#[tokio::test]
async fn restart_replaces_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_server(&dir, "while true; do sleep 0.1; done");
    let config = config_for(exe);

    let supervisor = Supervisor::new();
    let first = supervisor.start(&config).await.unwrap();
    let second = supervisor.restart(&config).await.unwrap();

    assert_ne!(first.pid, second.pid);
    assert_eq!(supervisor.status().await.state, SupervisorState::Running);

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn start_outcome_carries_the_resolved_command() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_server(&dir, "while true; do sleep 0.1; done");
    let config = config_for(exe.clone()).with_port(9123);

    let supervisor = Supervisor::new();
    let outcome = supervisor.start(&config).await.unwrap();

    assert_eq!(outcome.command.program, exe);
    let rendered = outcome.command.rendered();
    assert!(rendered.contains("--port 9123"));
    assert!(rendered.contains("-m /models/test.gguf"));

    // Status exposes the same diagnostics while running
    let status = supervisor.status().await;
    assert_eq!(status.command, Some(rendered));

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn log_stream_captures_and_classifies_output() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_server(
        &dir,
        "echo 'server listening'\necho 'error: failed to load tensor' 1>&2\nsleep 5",
    );

    let supervisor = Supervisor::new();
    let mut sub = supervisor
        .subscribe_logs()
        .with_poll_interval(Duration::from_millis(200));

    supervisor.start(&config_for(exe)).await.unwrap();

    let mut lines = Vec::new();
    for _ in 0..20 {
        match sub.next().await {
            Some(LogStreamEvent::Line(event)) => {
                lines.push(event);
                if lines.len() == 2 {
                    break;
                }
            }
            Some(LogStreamEvent::Heartbeat) => {}
            None => break,
        }
    }

    assert_eq!(lines.len(), 2, "expected both output lines");
    let texts: Vec<&str> = lines.iter().map(|e| e.text.as_str()).collect();
    assert!(texts.contains(&"server listening"));
    assert!(texts.contains(&"error: failed to load tensor"));
    let error_event = lines
        .iter()
        .find(|e| e.text.starts_with("error"))
        .unwrap();
    assert_eq!(
        error_event.category,
        llamaforge_core::LogCategory::Error
    );

    supervisor.stop().await.unwrap();

    // Recent snapshot survives the stop
    assert!(supervisor.recent_logs().len() >= 2);
}

#[tokio::test]
async fn no_log_lines_arrive_after_stop_returns() {
    let dir = tempfile::tempdir().unwrap();
    // Steady output until killed
    let exe = fake_server(&dir, "while true; do echo 'server tick'; sleep 0.01; done");
    let supervisor = Supervisor::new();

    supervisor.start(&config_for(exe)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    supervisor.stop().await.unwrap();

    // stop() drains the reader tasks; the recent buffer must be settled
    // by the time it returns, or a fast restart would misattribute lines
    let settled = supervisor.recent_logs().len();
    assert!(settled > 0, "expected some captured output");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(supervisor.recent_logs().len(), settled);
}

#[tokio::test]
async fn stopping_kills_helper_processes_too() {
    let dir = tempfile::tempdir().unwrap();
    // Server that spawns a long-lived helper in its process group
    let exe = fake_server(&dir, "sleep 60 &\nwhile true; do sleep 0.1; done");
    let supervisor = Supervisor::new();

    let outcome = supervisor.start(&config_for(exe)).await.unwrap();
    supervisor.stop().await.unwrap();

    // The whole group received SIGKILL; the group leader must be gone
    let alive = nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(i32::try_from(outcome.pid).unwrap()),
        None,
    )
    .is_ok();
    assert!(!alive, "process group leader should be dead");
}
