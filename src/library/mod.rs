//! Completed (and in-progress) recordings on disk.
//!
//! An artifact is either a `rec_*` folder written by the supervisor (video
//! plus `meta.json`) or a bare `rec_*.<ext>` file left by older layouts.
//! The artifact id is the folder or file name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::CaptureFormat;
use crate::error::{RecorderError, Result};
use crate::probe::StreamMetadata;
use crate::recording::RECORDING_PREFIX;
use crate::store::{load_json, save_json, SessionTable};
use crate::upload::UploadJob;

pub const META_FILE_NAME: &str = "meta.json";

/// Side document stored next to each recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub game: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub upload_links: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RecordingMetadata {
    pub fn new(channel: &str, stream: StreamMetadata, start_time: String, format: CaptureFormat) -> Self {
        Self {
            channel: channel.to_string(),
            title: stream.title,
            game: stream.game,
            author: stream.author,
            start_time,
            format: format.extension().to_string(),
            upload_links: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn load(folder: &Path) -> Self {
        load_json(&folder.join(META_FILE_NAME), Self::default())
    }

    pub fn save(&self, folder: &Path) -> Result<()> {
        save_json(&folder.join(META_FILE_NAME), self, false)
    }

    /// Records a public link for a finished upload.
    pub fn record_upload_link(folder: &Path, target: &str, link: &str) -> Result<()> {
        let mut meta = Self::load(folder);
        meta.upload_links.insert(target.to_string(), link.to_string());
        meta.save(folder)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Folder,
    Legacy,
}

/// An artifact resolved to its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub id: String,
    pub kind: ArtifactKind,
    /// The folder or the legacy file itself
    pub path: PathBuf,
    pub video_path: PathBuf,
}

impl ResolvedArtifact {
    /// Folder holding `meta.json`, if the artifact has one
    pub fn folder(&self) -> Option<&Path> {
        match self.kind {
            ArtifactKind::Folder => Some(&self.path),
            ArtifactKind::Legacy => None,
        }
    }
}

/// Listing entry for the operator
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub id: String,
    pub kind: ArtifactKind,
    pub title: String,
    pub game: String,
    pub author: String,
    pub upload_links: BTreeMap<String, String>,
    pub video_path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    pub is_recording: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadJob>,
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            CaptureFormat::VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn find_video(folder: &Path) -> Option<PathBuf> {
    let mut videos: Vec<PathBuf> = fs::read_dir(folder)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_video(path))
        .collect();
    videos.sort();
    videos.into_iter().next()
}

/// Reduces an operator-supplied id to a single path component.
pub fn sanitize_id(id: &str) -> Result<String> {
    let trimmed = id.trim();
    let invalid = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains('\0');
    if invalid {
        return Err(RecorderError::InvalidRequest(format!(
            "Invalid recording id: {:?}",
            id
        )));
    }
    Ok(trimmed.to_string())
}

/// Whether the session table still references this artifact
pub fn is_being_recorded(sessions: &SessionTable, id: &str) -> bool {
    sessions.values().any(|session| {
        session.folder_name == id
            || session
                .filename
                .file_name()
                .map(|name| name == id)
                .unwrap_or(false)
    })
}

#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Finds a recording by id. Only `rec_*` folders holding a video and
    /// `rec_*` video files count; every other entry in the data directory
    /// is reported as missing.
    pub fn resolve(&self, id: &str) -> Result<ResolvedArtifact> {
        let id = sanitize_id(id)?;
        let path = self.root.join(&id);
        let missing = || RecorderError::not_found(format!("Recording {}", id));

        if !id.starts_with(RECORDING_PREFIX) {
            return Err(missing());
        }

        if path.is_dir() {
            let video_path = find_video(&path).ok_or_else(|| {
                RecorderError::not_found(format!("Video file in recording {}", id))
            })?;
            return Ok(ResolvedArtifact {
                id,
                kind: ArtifactKind::Folder,
                path,
                video_path,
            });
        }

        if path.is_file() && is_video(&path) {
            return Ok(ResolvedArtifact {
                id,
                kind: ArtifactKind::Legacy,
                video_path: path.clone(),
                path,
            });
        }

        Err(missing())
    }

    /// Lists artifacts, newest first. Upload status is left for the caller.
    pub fn list(&self, sessions: &SessionTable) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if !name.starts_with(RECORDING_PREFIX) {
                continue;
            }

            let is_recording = is_being_recorded(sessions, &name);

            if path.is_dir() {
                let Some(video_path) = find_video(&path) else {
                    continue;
                };
                let meta = RecordingMetadata::load(&path);
                let (size_bytes, modified) = file_stats(&video_path);
                artifacts.push(Artifact {
                    title: non_empty(meta.title, &name),
                    game: meta.game,
                    author: meta.author,
                    upload_links: meta.upload_links,
                    id: name,
                    kind: ArtifactKind::Folder,
                    video_path,
                    size_bytes,
                    modified,
                    is_recording,
                    upload: None,
                });
            } else if path.is_file() && is_video(&path) {
                let (size_bytes, modified) = file_stats(&path);
                artifacts.push(Artifact {
                    title: name.clone(),
                    game: "Legacy".to_string(),
                    author: String::new(),
                    upload_links: BTreeMap::new(),
                    id: name,
                    kind: ArtifactKind::Legacy,
                    video_path: path,
                    size_bytes,
                    modified,
                    is_recording,
                    upload: None,
                });
            }
        }

        artifacts.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.id.cmp(&b.id)));
        Ok(artifacts)
    }

    /// Removes an artifact from disk. Lock checks belong to the caller.
    ///
    /// A `rec_*` folder is removed even without a video in it, so a
    /// capture that never produced output can still be cleaned up.
    pub fn delete(&self, id: &str) -> Result<()> {
        let id = sanitize_id(id)?;
        let path = self.root.join(&id);

        if !id.starts_with(RECORDING_PREFIX) {
            return Err(RecorderError::not_found(format!("Recording {}", id)));
        }

        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else if path.is_file() && is_video(&path) {
            fs::remove_file(&path)?;
        } else {
            return Err(RecorderError::not_found(format!("Recording {}", id)));
        }

        tracing::info!(artifact_id = %id, "Deleted recording");
        Ok(())
    }
}

fn non_empty(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

fn file_stats(path: &Path) -> (u64, Option<DateTime<Utc>>) {
    match fs::metadata(path) {
        Ok(meta) => (meta.len(), meta.modified().ok().map(DateTime::<Utc>::from)),
        Err(_) => (0, None),
    }
}
