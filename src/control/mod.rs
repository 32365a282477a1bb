//! Operator operations, independent of the transport that carries them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Settings, SettingsPatch};
use crate::error::{RecorderError, Result};
use crate::library::{is_being_recorded, sanitize_id, Artifact, Library};
use crate::recording::{ProcessController, SourceState};
use crate::store::{ServiceState, Source, StateStore};
use crate::upload::{UploadJob, UploadMetadata, UploadReceipt, UploadService, UploadTarget};

#[derive(Debug, Clone, Serialize)]
pub struct ActiveRecording {
    pub channel: String,
    pub pid: u32,
    pub folder_name: String,
    pub filename: PathBuf,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub active: bool,
    pub state: SourceState,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub service_enabled: bool,
    pub sources: Vec<SourceStatus>,
    pub active_recordings: Vec<ActiveRecording>,
    pub active_uploads: BTreeMap<String, UploadJob>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    pub channel: String,
    pub pid: u32,
    /// Whether the process was confirmed gone after the grace window
    pub terminated: bool,
}

/// Reduces operator input to a source name. A pasted channel URL keeps
/// only its last path segment.
pub fn normalize_source_name(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let without_query = trimmed.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
    let name = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_start_matches('@')
        .to_lowercase();

    if name.is_empty() {
        return Err(RecorderError::InvalidRequest(
            "Channel name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

#[derive(Clone)]
pub struct ControlPlane {
    store: StateStore,
    library: Library,
    uploads: UploadService,
    processes: Arc<dyn ProcessController>,
    stop_grace: Duration,
}

impl ControlPlane {
    pub fn new(
        store: StateStore,
        uploads: UploadService,
        processes: Arc<dyn ProcessController>,
        stop_grace: Duration,
    ) -> Self {
        Self {
            library: Library::new(store.root()),
            store,
            uploads,
            processes,
            stop_grace,
        }
    }

    pub fn status(&self) -> StatusReport {
        let service = self.store.load_service_state();
        let sessions = self.store.load_sessions();

        let sources = self
            .store
            .load_watchlist()
            .iter()
            .map(|source| SourceStatus {
                name: source.name.clone(),
                active: source.enabled,
                state: SourceState::from_tracking(sessions.contains_key(&source.name)),
            })
            .collect();

        let active_recordings = sessions
            .into_iter()
            .map(|(channel, session)| ActiveRecording {
                channel,
                pid: session.pid,
                folder_name: session.folder_name,
                filename: session.filename,
                start_time: session.start_time,
            })
            .collect();

        StatusReport {
            service_enabled: service.enabled,
            sources,
            active_recordings,
            active_uploads: self.uploads.locks().snapshot(),
        }
    }

    pub fn toggle_service(&self) -> Result<ServiceState> {
        let mut state = self.store.load_service_state();
        state.enabled = !state.enabled;
        self.store.save_service_state(&state)?;
        tracing::info!(enabled = state.enabled, "Service toggled");
        Ok(state)
    }

    pub fn list_sources(&self) -> Vec<Source> {
        self.store.load_watchlist().iter().cloned().collect()
    }

    pub fn add_source(&self, raw: &str) -> Result<Source> {
        let name = normalize_source_name(raw)?;
        let mut watchlist = self.store.load_watchlist();
        watchlist.add(&name)?;
        self.store.save_watchlist(&watchlist)?;
        tracing::info!(source = %name, "Channel added");
        Ok(Source::new(name))
    }

    /// Removing an unknown source succeeds without writing.
    pub fn remove_source(&self, name: &str) -> Result<bool> {
        let mut watchlist = self.store.load_watchlist();
        let removed = watchlist.remove(name.trim());
        if removed {
            self.store.save_watchlist(&watchlist)?;
            tracing::info!(source = %name, "Channel removed");
        }
        Ok(removed)
    }

    pub fn toggle_source(&self, name: &str) -> Result<Source> {
        let name = name.trim();
        let mut watchlist = self.store.load_watchlist();
        let enabled = watchlist.toggle(name)?;
        self.store.save_watchlist(&watchlist)?;
        tracing::info!(source = %name, active = enabled, "Channel toggled");
        Ok(Source {
            name: name.to_string(),
            enabled,
        })
    }

    /// Stops a recording: the session entry goes first, then the process
    /// tree is terminated off the async workers.
    pub async fn stop_session(&self, source: &str) -> Result<StopOutcome> {
        let sessions = self.store.load_sessions();
        let session = sessions
            .get(source)
            .ok_or_else(|| RecorderError::not_found(format!("Recording for channel {}", source)))?;

        // Held until the process is gone so no upload can start meanwhile.
        let _hold = self.uploads.locks().hold(&session.folder_name)?;

        let pid = session.pid;
        self.store.remove_session(source)?;

        let processes = self.processes.clone();
        let grace = self.stop_grace;
        let terminated = tokio::task::spawn_blocking(move || processes.terminate_tree(pid, grace))
            .await
            .map_err(|e| RecorderError::internal(format!("Stop task failed: {}", e)))?;

        tracing::info!(source = %source, pid = pid, terminated = terminated, "Recording stopped by operator");
        Ok(StopOutcome {
            channel: source.to_string(),
            pid,
            terminated,
        })
    }

    pub fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        let sessions = self.store.load_sessions();
        let locks = self.uploads.locks();
        let mut artifacts = self.library.list(&sessions)?;
        for artifact in &mut artifacts {
            artifact.upload = locks.get(&artifact.id);
        }
        Ok(artifacts)
    }

    pub fn delete_artifact(&self, id: &str) -> Result<()> {
        let id = sanitize_id(id)?;

        let _hold = self.uploads.locks().hold(&id)?;
        if is_being_recorded(&self.store.load_sessions(), &id) {
            return Err(RecorderError::conflict(format!("Recording {} is still being recorded", id)));
        }

        self.library.delete(&id)
    }

    pub fn settings(&self) -> Settings {
        self.store.load_settings()
    }

    pub fn update_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        let mut settings = self.store.load_settings();
        settings.apply(patch)?;
        self.store.save_settings(&settings)?;
        tracing::info!(
            poll_interval_seconds = settings.poll_interval_seconds,
            capture_format = settings.capture_format.extension(),
            "Settings updated"
        );
        Ok(settings)
    }

    /// Runs an upload to completion on its own task, so a dropped request
    /// does not cancel it.
    pub async fn upload(
        &self,
        id: &str,
        target: UploadTarget,
        metadata: UploadMetadata,
    ) -> Result<UploadReceipt> {
        let uploads = self.uploads.clone();
        let id = id.to_string();
        tokio::spawn(async move { uploads.upload(&id, target, metadata).await })
            .await
            .map_err(|e| RecorderError::internal(format!("Upload task failed: {}", e)))?
    }
}
