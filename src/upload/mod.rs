//! Uploading finished recordings to external targets.

mod archive;
mod lock;
mod progress;
mod service;
mod video_platform;

pub use archive::ArchiveUploader;
pub use lock::{ArtifactHold, UploadJob, UploadLease, UploadLockManager, UploadStatus};
pub use progress::{file_body, percent, CHUNK_SIZE};
pub use service::{ExecutorFactory, UploadService};
pub use video_platform::{access_token, VideoPlatformUploader};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{Settings, UploadConfig};
use crate::error::{RecorderError, Result};

/// `(bytes_done, bytes_total)` sink shared with the executor
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadTarget {
    #[serde(rename = "archive")]
    Archive,
    #[serde(rename = "video-platform", alias = "youtube")]
    VideoPlatform,
}

impl UploadTarget {
    pub fn label(self) -> &'static str {
        match self {
            UploadTarget::Archive => "archive",
            UploadTarget::VideoPlatform => "video-platform",
        }
    }

    /// Key under `upload_links` in the recording's side document
    pub fn link_key(self) -> &'static str {
        match self {
            UploadTarget::Archive => "archive",
            UploadTarget::VideoPlatform => "video_platform",
        }
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for UploadTarget {
    type Err = RecorderError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "archive" => Ok(UploadTarget::Archive),
            "video-platform" | "video_platform" | "youtube" => Ok(UploadTarget::VideoPlatform),
            other => Err(RecorderError::InvalidRequest(format!(
                "Unknown upload target: {}",
                other
            ))),
        }
    }
}

pub const DEFAULT_PRIVACY: &str = "private";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub privacy: String,
}

impl UploadMetadata {
    /// Fills blanks: title falls back to the artifact id, privacy to private.
    pub fn with_defaults(
        artifact_id: &str,
        title: Option<String>,
        description: Option<String>,
        privacy: Option<String>,
    ) -> Self {
        let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Self {
            title: non_blank(title).unwrap_or_else(|| artifact_id.to_string()),
            description: description.unwrap_or_default(),
            privacy: non_blank(privacy).unwrap_or_else(|| DEFAULT_PRIVACY.to_string()),
        }
    }
}

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub message: String,
    /// Public link recorded in the side document
    pub link: Option<String>,
}

/// A concrete upload backend
#[async_trait]
pub trait UploadExecutor: Send + Sync {
    fn target(&self) -> UploadTarget;

    async fn upload(
        &self,
        path: &Path,
        metadata: &UploadMetadata,
        progress: ProgressFn,
    ) -> Result<UploadReceipt>;
}

/// Builds the executor for `target` from the current settings.
pub fn executor_for(
    target: UploadTarget,
    settings: &Settings,
    config: &UploadConfig,
) -> Result<Box<dyn UploadExecutor>> {
    match target {
        UploadTarget::Archive => Ok(Box::new(ArchiveUploader::new(
            &settings.upload_targets.archive,
            config.timeout,
        )?)),
        UploadTarget::VideoPlatform => Ok(Box::new(VideoPlatformUploader::new(
            &settings.upload_targets.video_platform,
            config.timeout,
        )?)),
    }
}
