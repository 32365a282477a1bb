use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{RecorderError, Result};

/// Timestamp layout used in recording folder names
pub const FOLDER_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

fn default_true() -> bool {
    true
}

/// A watched live source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(rename = "active", alias = "enabled", default = "default_true")]
    pub enabled: bool,
}

impl Source {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }
}

/// Ordered list of sources. Order is display-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watchlist {
    sources: Vec<Source>,
}

impl Watchlist {
    pub fn new(sources: Vec<Source>) -> Self {
        Self { sources }
    }

    /// Builds a watchlist from a raw document, returning whether any legacy
    /// bare-string entries had to be migrated.
    pub fn from_document(raw: Value) -> (Self, bool) {
        let Value::Array(items) = raw else {
            tracing::warn!("Watchlist document is not an array, starting empty");
            return (Self::default(), false);
        };

        let mut migrated = false;
        let mut sources: Vec<Source> = Vec::with_capacity(items.len());
        for item in items {
            let source = match item {
                Value::String(name) => {
                    migrated = true;
                    Source::new(name)
                }
                other => match serde_json::from_value::<Source>(other) {
                    Ok(source) => source,
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping malformed watchlist entry");
                        continue;
                    }
                },
            };
            if !sources.iter().any(|s| s.name == source.name) {
                sources.push(source);
            }
        }

        (Self { sources }, migrated)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Names of sources the supervisor should probe
    pub fn enabled_names(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn add(&mut self, name: &str) -> Result<()> {
        if self.get(name).is_some() {
            return Err(RecorderError::conflict(format!("Channel {} already exists", name)));
        }
        self.sources.push(Source::new(name));
        Ok(())
    }

    /// Removes a source; returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s.name != name);
        before != self.sources.len()
    }

    /// Flips a source's enabled flag and returns the new value.
    pub fn toggle(&mut self, name: &str) -> Result<bool> {
        let source = self
            .sources
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| RecorderError::not_found(format!("Channel {}", name)))?;
        source.enabled = !source.enabled;
        Ok(source.enabled)
    }
}

/// One in-flight capture subprocess
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSession {
    pub pid: u32,
    /// Recording folder name, which is also the artifact id
    #[serde(default)]
    pub folder_name: String,
    /// Full capture output path
    pub filename: PathBuf,
    #[serde(default = "Utc::now", deserialize_with = "lenient_start_time")]
    pub start_time: DateTime<Utc>,
}

/// Accepts RFC 3339 as well as the folder-style `%Y-%m-%d_%H-%M-%S` stamp
/// older tables carry, so an old table is never discarded wholesale.
fn lenient_start_time<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    Ok(NaiveDateTime::parse_from_str(&raw, FOLDER_TIMESTAMP_FORMAT)
        .ok()
        .and_then(|naive| naive.and_local_timezone(Local).single())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(Utc::now))
}

impl RecordingSession {
    pub fn new(pid: u32, folder_name: impl Into<String>, filename: impl Into<PathBuf>) -> Self {
        Self {
            pid,
            folder_name: folder_name.into(),
            filename: filename.into(),
            start_time: Utc::now(),
        }
    }
}

/// Session table keyed by source name, so a source can never hold two
/// sessions at once.
pub type SessionTable = BTreeMap<String, RecordingSession>;

/// Gate for the supervisor's probing phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    #[serde(default)]
    pub enabled: bool,
}
