// Integration tests for signal-driven shutdown
// Each test sends SIGTERM to its own process, so handlers must be in place first
#![cfg(unix)]

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{enabled_store, live, FakeProber, FakeProcesses};
use live_recorder::config::CaptureConfig;
use live_recorder::recording::Supervisor;
use live_recorder::signal::shutdown_signal;

fn send_sigterm_to_self() {
    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());
}

/// A signal delivered before the future is first polled is not lost
#[tokio::test]
async fn test_signal_before_first_poll_is_kept() {
    let shutdown = shutdown_signal();
    send_sigterm_to_self();
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::time::timeout(Duration::from_secs(5), shutdown)
        .await
        .expect("shutdown future did not resolve");
}

/// A signal arriving during the first cycle still stops the captures it started
#[tokio::test]
async fn test_signal_during_first_cycle_stops_captures() {
    let (_dir, store) = enabled_store(&["alpha"]);
    let sup = Supervisor::new(
        store.clone(),
        FakeProber::new(),
        FakeProcesses::new(),
        CaptureConfig {
            stop_grace: Duration::from_millis(10),
            ..CaptureConfig::default()
        },
    );
    sup.prober().set("alpha", live("alpha"));

    let shutdown = shutdown_signal();
    send_sigterm_to_self();

    tokio::time::timeout(Duration::from_secs(5), sup.run_until(shutdown))
        .await
        .expect("supervisor kept polling after SIGTERM");

    let pids: HashSet<u32> = store.load_sessions().values().map(|s| s.pid).collect();
    assert_eq!(pids.len(), 1);
    let terminated: HashSet<u32> = sup.processes().terminated().into_iter().collect();
    assert_eq!(terminated, pids);
}
