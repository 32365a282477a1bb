//! Whole-document JSON state shared between the supervisor and the server.
//!
//! Both processes read and overwrite these files without any cross-process
//! locking. A read may observe a stale document if the other side writes in
//! between, and every mutation made through this module is idempotent at
//! the record level so two racing writers only ever produce a redundant
//! write. Loads never fail: a missing or unparseable document yields the
//! caller's default.

mod documents;

pub use documents::{
    RecordingSession, ServiceState, SessionTable, Source, Watchlist, FOLDER_TIMESTAMP_FORMAT,
};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::{RecorderError, Result};

/// Documents owned by the State Store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentId {
    Watchlist,
    Sessions,
    ServiceState,
    Settings,
}

impl DocumentId {
    pub fn file_name(self) -> &'static str {
        match self {
            DocumentId::Watchlist => "watchlist.json",
            DocumentId::Sessions => "active_recordings.json",
            DocumentId::ServiceState => "service_state.json",
            DocumentId::Settings => "settings.json",
        }
    }

    fn pretty(self) -> bool {
        matches!(self, DocumentId::Settings)
    }
}

/// Reads a JSON file, absorbing absence and corruption into `default`.
pub fn load_json<T: DeserializeOwned>(path: &Path, default: T) -> T {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(_) => return default,
    };

    match serde_json::from_slice(&raw) {
        Ok(value) => value,
        Err(e) => {
            let err = RecorderError::StateCorruption(path.display().to_string(), e.to_string());
            tracing::warn!(error = %err, "Falling back to default document");
            default
        }
    }
}

/// Overwrites a JSON file with the full document.
pub fn save_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };
    fs::write(path, bytes)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    /// Opens the store rooted at `root`, creating the directory if needed.
    ///
    /// This is the only fatal step of startup.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            RecorderError::internal(format!(
                "Failed to create data directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, doc: DocumentId) -> PathBuf {
        self.root.join(doc.file_name())
    }

    pub fn load<T: DeserializeOwned>(&self, doc: DocumentId, default: T) -> T {
        load_json(&self.path(doc), default)
    }

    pub fn save<T: Serialize>(&self, doc: DocumentId, value: &T) -> Result<()> {
        save_json(&self.path(doc), value, doc.pretty())
    }

    /// Loads the watchlist, migrating the legacy bare-string shape in place.
    pub fn load_watchlist(&self) -> Watchlist {
        let raw: Value = self.load(DocumentId::Watchlist, Value::Array(Vec::new()));
        let (watchlist, migrated) = Watchlist::from_document(raw);

        if migrated {
            tracing::info!(
                sources = watchlist.len(),
                "Migrated legacy watchlist to source records"
            );
            if let Err(e) = self.save_watchlist(&watchlist) {
                tracing::warn!(error = %e, "Failed to rewrite migrated watchlist");
            }
        }

        watchlist
    }

    pub fn save_watchlist(&self, watchlist: &Watchlist) -> Result<()> {
        self.save(DocumentId::Watchlist, watchlist)
    }

    pub fn load_sessions(&self) -> SessionTable {
        self.load(DocumentId::Sessions, SessionTable::default())
    }

    pub fn save_sessions(&self, sessions: &SessionTable) -> Result<()> {
        self.save(DocumentId::Sessions, sessions)
    }

    pub fn load_service_state(&self) -> ServiceState {
        self.load(DocumentId::ServiceState, ServiceState::default())
    }

    pub fn save_service_state(&self, state: &ServiceState) -> Result<()> {
        self.save(DocumentId::ServiceState, state)
    }

    pub fn load_settings(&self) -> Settings {
        self.load(DocumentId::Settings, Settings::default())
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.save(DocumentId::Settings, settings)
    }

    /// Applies `mutate` to the freshest session table and writes it back
    /// only when the closure reports a change.
    ///
    /// Re-reading right before the write keeps each mutation scoped to the
    /// records it touches, so an interleaved write from the other process
    /// is not rolled back wholesale.
    pub fn update_sessions<F>(&self, mutate: F) -> Result<bool>
    where
        F: FnOnce(&mut SessionTable) -> bool,
    {
        let mut sessions = self.load_sessions();
        let changed = mutate(&mut sessions);
        if changed {
            self.save_sessions(&sessions)?;
        }
        Ok(changed)
    }

    /// Removes a session entry. Removing an absent entry is a no-op and
    /// does not write.
    pub fn remove_session(&self, source: &str) -> Result<Option<RecordingSession>> {
        let mut removed = None;
        self.update_sessions(|sessions| {
            removed = sessions.remove(source);
            removed.is_some()
        })?;
        Ok(removed)
    }
}
