// Shared fixtures for the integration tests: a temp State Store and
// in-memory stand-ins for the capture tool and the OS process table.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

use live_recorder::error::{RecorderError, Result};
use live_recorder::probe::{CaptureDescriptor, LivenessProber, ProbeOutcome, StreamMetadata};
use live_recorder::recording::{CaptureCommand, ProcessController};
use live_recorder::store::{ServiceState, Source, StateStore, Watchlist};

pub fn temp_store() -> (TempDir, StateStore) {
    let dir = TempDir::new().unwrap();
    let store = StateStore::open(dir.path().join("data")).unwrap();
    (dir, store)
}

/// A store with the service enabled and the given sources watched
pub fn enabled_store(sources: &[&str]) -> (TempDir, StateStore) {
    let (dir, store) = temp_store();
    store.save_service_state(&ServiceState { enabled: true }).unwrap();
    let watchlist = Watchlist::new(sources.iter().map(|name| Source::new(*name)).collect());
    store.save_watchlist(&watchlist).unwrap();
    (dir, store)
}

pub fn live(source: &str) -> ProbeOutcome {
    ProbeOutcome::Live(CaptureDescriptor {
        url: format!("https://www.twitch.tv/{}", source),
        quality: "best".to_string(),
        qualities: vec!["best".to_string(), "worst".to_string()],
    })
}

/// Prober answering from a fixed table; unknown sources are offline.
#[derive(Default)]
pub struct FakeProber {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
    probed: Mutex<Vec<String>>,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, source: &str, outcome: ProbeOutcome) {
        self.outcomes.lock().unwrap().insert(source.to_string(), outcome);
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl LivenessProber for FakeProber {
    async fn probe(&self, source: &str) -> ProbeOutcome {
        self.probed.lock().unwrap().push(source.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .get(source)
            .cloned()
            .unwrap_or(ProbeOutcome::Offline)
    }

    async fn fetch_metadata(&self, source: &str) -> StreamMetadata {
        StreamMetadata {
            title: format!("{} live", source),
            game: "Chess".to_string(),
            author: source.to_string(),
        }
    }
}

#[derive(Default)]
struct ProcessTable {
    next_pid: u32,
    running: HashSet<u32>,
    spawned: Vec<CaptureCommand>,
    terminated: Vec<u32>,
    fail_spawn: bool,
}

/// Process table kept in memory. Spawned pids stay running until killed.
pub struct FakeProcesses {
    table: Mutex<ProcessTable>,
}

impl Default for FakeProcesses {
    fn default() -> Self {
        Self {
            table: Mutex::new(ProcessTable {
                next_pid: 1000,
                ..ProcessTable::default()
            }),
        }
    }
}

impl FakeProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a capture exiting on its own
    pub fn exit(&self, pid: u32) {
        self.table.lock().unwrap().running.remove(&pid);
    }

    pub fn mark_running(&self, pid: u32) {
        self.table.lock().unwrap().running.insert(pid);
    }

    pub fn fail_spawns(&self, fail: bool) {
        self.table.lock().unwrap().fail_spawn = fail;
    }

    pub fn spawned(&self) -> Vec<CaptureCommand> {
        self.table.lock().unwrap().spawned.clone()
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.table.lock().unwrap().terminated.clone()
    }
}

impl ProcessController for FakeProcesses {
    fn is_running(&self, pid: u32) -> bool {
        self.table.lock().unwrap().running.contains(&pid)
    }

    fn spawn_detached(&self, command: &CaptureCommand) -> Result<u32> {
        let mut table = self.table.lock().unwrap();
        if table.fail_spawn {
            return Err(RecorderError::ProcessSpawnFailure(format!(
                "{}: No such file or directory",
                command.program
            )));
        }
        table.next_pid += 1;
        let pid = table.next_pid;
        table.running.insert(pid);
        table.spawned.push(command.clone());
        Ok(pid)
    }

    fn terminate_tree(&self, pid: u32, _grace: Duration) -> bool {
        let mut table = self.table.lock().unwrap();
        table.running.remove(&pid);
        table.terminated.push(pid);
        true
    }
}
