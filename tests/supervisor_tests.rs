//! Supervisor and monitor tests against real short-lived shell processes.

use mc_manager::process::{MonitorConfig, ProcessControl, ProcessMonitor, ProcessSupervisor};
use std::time::Duration;

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

async fn wait_for_logs(
    supervisor: &ProcessSupervisor,
    pid: u32,
    needle: &str,
) -> Option<String> {
    for _ in 0..100 {
        if let Some(logs) = supervisor.logs(pid).await {
            if logs.contains(needle) {
                return Some(logs);
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    None
}

#[tokio::test]
async fn spawn_captures_stdout_and_stderr() {
    let supervisor = ProcessSupervisor::new();
    let dir = tempfile::tempdir().unwrap();

    let pid = supervisor
        .spawn(&sh("echo out; echo err 1>&2"), dir.path())
        .await
        .unwrap();

    let logs = wait_for_logs(&supervisor, pid, "out").await.unwrap();
    assert!(logs.contains("out"));
    // stderr lands in the same log.
    assert!(wait_for_logs(&supervisor, pid, "err").await.is_some());
}

#[tokio::test]
async fn spawn_runs_in_the_given_workdir() {
    let supervisor = ProcessSupervisor::new();
    let dir = tempfile::tempdir().unwrap();

    let pid = supervisor.spawn(&sh("pwd"), dir.path()).await.unwrap();

    let logs = wait_for_logs(&supervisor, pid, "/").await.unwrap();
    // Compare by suffix; the tempdir may live behind a symlink.
    let reported = logs.lines().next().unwrap();
    assert!(
        reported.ends_with(dir.path().file_name().unwrap().to_str().unwrap()),
        "unexpected workdir: {}",
        reported
    );
}

#[tokio::test]
async fn empty_command_is_rejected() {
    let supervisor = ProcessSupervisor::new();
    let dir = tempfile::tempdir().unwrap();
    assert!(supervisor.spawn(&[], dir.path()).await.is_err());
}

#[tokio::test]
async fn send_input_reaches_the_child() {
    let supervisor = ProcessSupervisor::new();
    let dir = tempfile::tempdir().unwrap();

    let pid = supervisor
        .spawn(&sh("read line; echo \"got $line\""), dir.path())
        .await
        .unwrap();

    supervisor.send_input(pid, "ping\n").await.unwrap();
    assert!(wait_for_logs(&supervisor, pid, "got ping").await.is_some());
}

#[tokio::test]
async fn send_input_to_unknown_pid_is_dropped() {
    let supervisor = ProcessSupervisor::new();
    assert!(supervisor.send_input(999_999, "hello\n").await.is_ok());
}

#[tokio::test]
async fn snapshot_drains_the_output_delta() {
    let supervisor = ProcessSupervisor::new();
    let dir = tempfile::tempdir().unwrap();

    let pid = supervisor
        .spawn(&sh("echo hello; sleep 5"), dir.path())
        .await
        .unwrap();
    wait_for_logs(&supervisor, pid, "hello").await.unwrap();

    let snapshot = supervisor.snapshot(pid).await.unwrap();
    assert!(snapshot.stdout_delta.contains("hello"));

    // Drained: the delta is gone, the full log is not.
    let snapshot = supervisor.snapshot(pid).await.unwrap();
    assert!(snapshot.stdout_delta.is_empty());
    assert!(supervisor.logs(pid).await.unwrap().contains("hello"));

    supervisor.kill(pid).await.unwrap();
}

#[tokio::test]
async fn kill_terminates_the_process() {
    let supervisor = ProcessSupervisor::new();
    let dir = tempfile::tempdir().unwrap();

    let pid = supervisor.spawn(&sh("sleep 30"), dir.path()).await.unwrap();
    assert!(supervisor.is_alive(pid).await);

    supervisor.kill(pid).await.unwrap();
    for _ in 0..100 {
        if !supervisor.is_alive(pid).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("process survived kill");
}

#[tokio::test]
async fn kill_unknown_pid_is_an_error() {
    let supervisor = ProcessSupervisor::new();
    assert!(supervisor.kill(999_999).await.is_err());
}

#[tokio::test]
async fn monitor_reaps_exited_processes() {
    let supervisor = ProcessSupervisor::new();
    let mut monitor = ProcessMonitor::new(
        supervisor.clone(),
        MonitorConfig {
            tick: Duration::from_millis(50),
            resource_interval: Duration::from_millis(100),
        },
    );
    monitor.start();

    let dir = tempfile::tempdir().unwrap();
    supervisor.spawn(&sh("true"), dir.path()).await.unwrap();
    assert_eq!(supervisor.process_count().await, 1);

    for _ in 0..100 {
        if supervisor.process_count().await == 0 {
            monitor.stop();
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("exited process was never reaped");
}

#[tokio::test]
async fn subscribers_receive_periodic_snapshots() {
    let supervisor = ProcessSupervisor::new();
    let mut monitor = ProcessMonitor::new(
        supervisor.clone(),
        MonitorConfig {
            tick: Duration::from_millis(50),
            resource_interval: Duration::from_millis(100),
        },
    );
    monitor.start();

    let dir = tempfile::tempdir().unwrap();
    let pid = supervisor
        .spawn(&sh("echo hi; sleep 10"), dir.path())
        .await
        .unwrap();

    let mut rx = supervisor.subscribe(pid).await.unwrap();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no snapshot within the sampling window")
        .unwrap();
    assert!(snapshot.usage.memory_total > 0);

    monitor.stop();
    supervisor.kill(pid).await.unwrap();
}

#[tokio::test]
async fn subscribe_to_unknown_pid_returns_none() {
    let supervisor = ProcessSupervisor::new();
    assert!(supervisor.subscribe(999_999).await.is_none());
}
