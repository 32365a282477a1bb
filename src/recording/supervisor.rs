use chrono::Local;
use std::fs;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::capture::{allocate_output, CaptureCommand};
use super::process::ProcessController;
use super::state::SourceState;
use crate::config::{CaptureConfig, Settings};
use crate::error::Result;
use crate::library::RecordingMetadata;
use crate::probe::{LivenessProber, ProbeOutcome};
use crate::store::{RecordingSession, SessionTable, StateStore};

/// Result of one reap pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Sources whose session was removed
    pub removed: Vec<String>,
    /// Whether the session table was written
    pub persisted: bool,
}

/// Summary of one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub enabled: bool,
    pub reaped: Vec<String>,
    pub started: Vec<String>,
    pub failed: Vec<String>,
    /// Sleep before the next cycle
    pub interval: Duration,
}

impl CycleReport {
    fn paused(interval: Duration) -> Self {
        Self {
            enabled: false,
            reaped: Vec::new(),
            started: Vec::new(),
            failed: Vec::new(),
            interval,
        }
    }
}

/// The polling engine: reap dead captures, then start captures for newly
/// live sources. Holds no session state of its own; every cycle starts
/// from the State Store.
pub struct Supervisor<P, C> {
    store: StateStore,
    prober: P,
    processes: Arc<C>,
    capture: CaptureConfig,
}

impl<P, C> Supervisor<P, C>
where
    P: LivenessProber,
    C: ProcessController + 'static,
{
    pub fn new(store: StateStore, prober: P, processes: C, capture: CaptureConfig) -> Self {
        Self {
            store,
            prober,
            processes: Arc::new(processes),
            capture,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    pub fn processes(&self) -> &C {
        self.processes.as_ref()
    }

    /// Runs one poll cycle. Per-source failures are logged and reported,
    /// never returned.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let settings = self.store.load_settings();
        let interval = settings.poll_interval();

        if !self.store.load_service_state().enabled {
            tracing::debug!("Service disabled, skipping cycle");
            return Ok(CycleReport::paused(interval));
        }

        let sessions = self.store.load_sessions();
        let reap = self.reap(&sessions)?;

        let tracked = self.store.load_sessions();
        let mut report = CycleReport {
            enabled: true,
            reaped: reap.removed,
            started: Vec::new(),
            failed: Vec::new(),
            interval,
        };

        for source in self.store.load_watchlist().enabled_names() {
            if tracked.contains_key(&source) {
                continue;
            }
            match self.start_source(&source, &settings).await {
                Ok(Some(session)) => {
                    tracing::info!(
                        source = %source,
                        pid = session.pid,
                        folder = %session.folder_name,
                        "Recording started"
                    );
                    report.started.push(source);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "Failed to start recording");
                    report.failed.push(source);
                }
            }
        }

        Ok(report)
    }

    /// Removes sessions whose process is no longer running.
    ///
    /// Liveness is judged on `sessions`; the removal is applied to the
    /// freshest table and only drops an entry whose pid still matches, so
    /// a concurrent stop or a replaced session is left alone. Writes at
    /// most once, and only if something was removed.
    pub fn reap(&self, sessions: &SessionTable) -> Result<ReapReport> {
        let dead: Vec<(String, u32)> = sessions
            .iter()
            .filter(|(_, session)| !self.processes.is_running(session.pid))
            .map(|(source, session)| (source.clone(), session.pid))
            .collect();

        if dead.is_empty() {
            return Ok(ReapReport::default());
        }

        let mut removed = Vec::new();
        let persisted = self.store.update_sessions(|table| {
            for (source, pid) in &dead {
                let matches = table.get(source).map(|s| s.pid == *pid).unwrap_or(false);
                if matches {
                    table.remove(source);
                    removed.push(source.clone());
                }
            }
            !removed.is_empty()
        })?;

        for source in &removed {
            tracing::info!(source = %source, state = %SourceState::Idle, "Reaped finished recording");
        }

        Ok(ReapReport { removed, persisted })
    }

    /// Probes one untracked source and starts a capture if it is live.
    ///
    /// Returns `Ok(None)` when the source is offline or the probe could
    /// not tell.
    pub async fn start_source(
        &self,
        source: &str,
        settings: &Settings,
    ) -> Result<Option<RecordingSession>> {
        let descriptor = match self.prober.probe(source).await {
            ProbeOutcome::Live(descriptor) => descriptor,
            ProbeOutcome::Offline => return Ok(None),
            ProbeOutcome::Unknown(reason) => {
                tracing::warn!(source = %source, error = %reason, "Probe inconclusive, retrying next cycle");
                return Ok(None);
            }
        };

        tracing::debug!(
            source = %source,
            state = %SourceState::Starting,
            qualities = ?descriptor.qualities,
            "Source is live"
        );

        let now = Local::now();
        let output = allocate_output(self.store.root(), source, now, settings.capture_format)?;

        let stream = self.prober.fetch_metadata(source).await;
        let metadata = RecordingMetadata::new(source, stream, now.to_rfc3339(), settings.capture_format);
        if let Err(e) = metadata.save(&output.folder) {
            tracing::warn!(source = %source, error = %e, "Failed to write recording metadata");
        }

        let command = CaptureCommand::new(&self.capture.tool, &descriptor, &output.video_path);
        let pid = match self.processes.spawn_detached(&command) {
            Ok(pid) => pid,
            Err(e) => {
                let _ = fs::remove_dir_all(&output.folder);
                return Err(e);
            }
        };

        let session = RecordingSession::new(pid, output.folder_name.clone(), output.video_path);
        let persisted = self.store.update_sessions(|table| {
            table.insert(source.to_string(), session.clone());
            true
        });

        if let Err(e) = persisted {
            // An untracked capture would run unmanaged.
            let processes = self.processes.clone();
            let grace = self.capture.stop_grace;
            let terminated = tokio::task::spawn_blocking(move || processes.terminate_tree(pid, grace))
                .await
                .unwrap_or(false);
            tracing::warn!(source = %source, pid = pid, terminated = terminated, "Session not persisted, capture stopped");
            return Err(e);
        }

        Ok(Some(session))
    }

    /// Terminates every capture in the session table. Returns how many
    /// are confirmed gone.
    pub fn terminate_all(&self) -> usize {
        let sessions = self.store.load_sessions();
        let mut stopped = 0;

        for (source, session) in &sessions {
            if self.processes.terminate_tree(session.pid, self.capture.stop_grace) {
                stopped += 1;
                tracing::info!(source = %source, pid = session.pid, "Stopped recording on shutdown");
            } else {
                tracing::warn!(source = %source, pid = session.pid, "Recording did not stop on shutdown");
            }
        }

        stopped
    }

    /// Polls until `shutdown` resolves, then terminates every tracked
    /// capture. A cycle in progress always runs to completion; a shutdown
    /// that resolved meanwhile is seen before the next sleep.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(data_dir = %self.store.root().display(), "Supervisor started");

        loop {
            let interval = match self.run_cycle().await {
                Ok(report) => report.interval,
                Err(e) => {
                    tracing::error!(error = %e, "Poll cycle failed");
                    self.store.load_settings().poll_interval()
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!("Supervisor stopping, terminating active recordings");
        let stopped = self.terminate_all();
        tracing::info!(stopped = stopped, "Supervisor stopped");
    }

    pub async fn run(&self) {
        self.run_until(std::future::pending::<()>()).await
    }
}
