//! OS process control for capture subprocesses.

use std::process::Stdio;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, Signal, System};

use super::capture::CaptureCommand;
use crate::error::{RecorderError, Result};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const KILL_SETTLE: Duration = Duration::from_millis(500);

/// Seam between the supervisor and the operating system
pub trait ProcessController: Send + Sync {
    /// True only for a live, non-zombie process. A missing or
    /// uninspectable process counts as not running.
    fn is_running(&self, pid: u32) -> bool;

    /// Launches a capture with standard streams detached and returns its pid
    /// without waiting on it.
    fn spawn_detached(&self, command: &CaptureCommand) -> Result<u32>;

    /// Terminates `pid` and its descendants: graceful signal first, forceful
    /// kill after `grace`. Best effort; returns whether the root is gone.
    fn terminate_tree(&self, pid: u32, grace: Duration) -> bool;
}

/// [`ProcessController`] backed by the real process table
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

impl SystemProcesses {
    pub fn new() -> Self {
        Self
    }
}

/// Orders `root` and every descendant found in `links` (pid, parent) so
/// children come before their parents.
pub(crate) fn process_tree(root: u32, links: &[(u32, Option<u32>)]) -> Vec<u32> {
    let mut ordered = vec![root];
    let mut cursor = 0;
    while cursor < ordered.len() {
        let parent = ordered[cursor];
        for (pid, ppid) in links {
            if *ppid == Some(parent) && !ordered.contains(pid) {
                ordered.push(*pid);
            }
        }
        cursor += 1;
    }
    ordered.reverse();
    ordered
}

impl ProcessController for SystemProcesses {
    fn is_running(&self, pid: u32) -> bool {
        let mut sys = System::new();
        let sys_pid = Pid::from_u32(pid);
        if !sys.refresh_process_specifics(sys_pid, ProcessRefreshKind::new()) {
            return false;
        }
        match sys.process(sys_pid) {
            Some(process) => !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
            None => false,
        }
    }

    fn spawn_detached(&self, command: &CaptureCommand) -> Result<u32> {
        // Dropping the tokio child neither kills nor leaks it: the runtime
        // reaps the exit status in the background.
        let child = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| {
                RecorderError::ProcessSpawnFailure(format!("{}: {}", command.program, e))
            })?;

        child.id().ok_or_else(|| {
            RecorderError::ProcessSpawnFailure(format!(
                "{} exited before its pid could be read",
                command.program
            ))
        })
    }

    fn terminate_tree(&self, pid: u32, grace: Duration) -> bool {
        let mut sys = System::new();
        sys.refresh_processes();

        if sys.process(Pid::from_u32(pid)).is_none() {
            return true;
        }

        let links: Vec<(u32, Option<u32>)> = sys
            .processes()
            .iter()
            .map(|(child, process)| (child.as_u32(), process.parent().map(|p| p.as_u32())))
            .collect();
        let tree = process_tree(pid, &links);

        for member in &tree {
            if let Some(process) = sys.process(Pid::from_u32(*member)) {
                // Platforms without SIGTERM get the forceful kill right away.
                if process.kill_with(Signal::Term).is_none() {
                    process.kill();
                }
            }
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if tree.iter().all(|member| !self.is_running(*member)) {
                return true;
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }

        sys.refresh_processes();
        for member in &tree {
            if self.is_running(*member) {
                if let Some(process) = sys.process(Pid::from_u32(*member)) {
                    tracing::warn!(pid = member, "Process ignored terminate, killing");
                    process.kill();
                }
            }
        }

        std::thread::sleep(KILL_SETTLE);
        !self.is_running(pid)
    }
}
