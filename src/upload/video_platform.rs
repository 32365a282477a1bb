use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, LOCATION};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

use super::{file_body, ProgressFn, UploadExecutor, UploadMetadata, UploadReceipt, UploadTarget};
use crate::config::VideoPlatformTarget;
use crate::error::{RecorderError, Result};

const DEFAULT_UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";
const WATCH_URL: &str = "https://youtu.be";
/// "Gaming"
const DEFAULT_CATEGORY_ID: &str = "20";

/// Extracts an access token from the stored token document.
///
/// Accepts a raw token string, a JSON document serialized as a string, or
/// an object carrying `access_token` (or `token`).
pub fn access_token(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            match serde_json::from_str::<Value>(raw) {
                Ok(parsed @ Value::Object(_)) => access_token(&parsed),
                Ok(Value::String(inner)) => access_token(&Value::String(inner)),
                _ => Some(raw.to_string()),
            }
        }
        Value::Object(fields) => ["access_token", "token"]
            .iter()
            .filter_map(|key| fields.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|token| !token.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: String,
}

/// Two-step resumable upload: open a session, then PUT the file to it
pub struct VideoPlatformUploader {
    token: String,
    upload_url: String,
    client: reqwest::Client,
}

impl VideoPlatformUploader {
    pub fn new(target: &VideoPlatformTarget, timeout: Duration) -> Result<Self> {
        if !target.enabled {
            return Err(RecorderError::UploadBackendUnavailable(
                "video platform uploads are disabled in settings".to_string(),
            ));
        }
        let token = access_token(&target.auth_token).ok_or_else(|| {
            RecorderError::CredentialsMissing(
                "video platform auth_token has no access token".to_string(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecorderError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            token,
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            client,
        })
    }

    pub fn with_upload_url(mut self, url: &str) -> Self {
        self.upload_url = url.to_string();
        self
    }

    fn session_request(&self, metadata: &UploadMetadata, size: u64) -> reqwest::RequestBuilder {
        let body = json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
                "categoryId": DEFAULT_CATEGORY_ID,
            },
            "status": {
                "privacyStatus": metadata.privacy,
                "selfDeclaredMadeForKids": false,
            }
        });

        self.client
            .post(&self.upload_url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header("x-upload-content-type", "video/*")
            .header("x-upload-content-length", size)
            .json(&body)
    }

    async fn open_session(&self, metadata: &UploadMetadata, size: u64) -> Result<String> {
        let response = self
            .session_request(metadata, size)
            .send()
            .await
            .map_err(|e| RecorderError::UploadFailed(format!("Session request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RecorderError::UploadFailed(format!(
                "Upload session rejected with status {}: {}",
                status, error_text
            )));
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                RecorderError::UploadFailed("Upload session response has no Location".to_string())
            })
    }
}

#[async_trait]
impl UploadExecutor for VideoPlatformUploader {
    fn target(&self) -> UploadTarget {
        UploadTarget::VideoPlatform
    }

    async fn upload(
        &self,
        path: &Path,
        metadata: &UploadMetadata,
        progress: ProgressFn,
    ) -> Result<UploadReceipt> {
        let (body, size) = file_body(path, progress).await?;
        let session_url = self.open_session(metadata, size).await?;

        let response = self
            .client
            .put(&session_url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await
            .map_err(|e| RecorderError::UploadFailed(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RecorderError::UploadFailed(format!(
                "Video upload failed with status {}: {}",
                status, error_text
            )));
        }

        let video: UploadedVideo = response.json().await.map_err(|e| {
            RecorderError::UploadFailed(format!("Failed to parse response: {}", e))
        })?;

        tracing::info!(video_id = %video.id, size = size, "Uploaded recording to video platform");

        Ok(UploadReceipt {
            message: format!("Uploaded to video platform! Video ID: {}", video.id),
            link: Some(format!("{}/{}", WATCH_URL, video.id)),
        })
    }
}
