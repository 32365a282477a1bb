use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{file_body, ProgressFn, UploadExecutor, UploadMetadata, UploadReceipt, UploadTarget};
use crate::config::ArchiveTarget;
use crate::error::{RecorderError, Result};

const DEFAULT_ARCHIVE_ENDPOINT: &str = "https://s3.us.archive.org";
const DEFAULT_DETAILS_URL: &str = "https://archive.org/details";

/// Uploads into a fresh item of an S3-style archive
pub struct ArchiveUploader {
    access_key: String,
    secret_key: String,
    endpoint: String,
    details_url: String,
    client: reqwest::Client,
}

/// `stream_rec_<unix seconds>_<random suffix>`
pub fn item_identifier() -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("stream_rec_{}_{}", seconds, suffix)
}

/// Metadata header values must be ASCII; anything else is sent URI-encoded.
fn header_value(value: &str) -> String {
    if value.is_ascii() && !value.chars().any(|c| c.is_ascii_control()) {
        value.to_string()
    } else {
        format!("uri({})", urlencoding::encode(value))
    }
}

impl ArchiveUploader {
    pub fn new(target: &ArchiveTarget, timeout: Duration) -> Result<Self> {
        if !target.has_credentials() {
            return Err(RecorderError::CredentialsMissing(
                "archive access_key and secret_key are required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecorderError::internal(format!("Failed to create HTTP client: {}", e)))?;

        let endpoint = target
            .extra
            .get("endpoint")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_ARCHIVE_ENDPOINT);

        Ok(Self {
            access_key: target.access_key.trim().to_string(),
            secret_key: target.secret_key.trim().to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            details_url: DEFAULT_DETAILS_URL.to_string(),
            client,
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str, details_url: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self.details_url = details_url.trim_end_matches('/').to_string();
        self
    }

    fn request(
        &self,
        identifier: &str,
        file_name: &str,
        metadata: &UploadMetadata,
    ) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/{}/{}",
            self.endpoint,
            identifier,
            urlencoding::encode(file_name)
        );

        let mut request = self
            .client
            .put(url)
            .header(
                "authorization",
                format!("LOW {}:{}", self.access_key, self.secret_key),
            )
            .header("x-amz-auto-make-bucket", "1")
            .header("x-archive-meta-mediatype", "movies")
            .header("x-archive-meta-collection", "opensource_movies")
            .header("x-archive-meta-title", header_value(&metadata.title));

        if !metadata.description.trim().is_empty() {
            request = request.header(
                "x-archive-meta-description",
                header_value(&metadata.description),
            );
        }
        request
    }
}

#[async_trait]
impl UploadExecutor for ArchiveUploader {
    fn target(&self) -> UploadTarget {
        UploadTarget::Archive
    }

    async fn upload(
        &self,
        path: &Path,
        metadata: &UploadMetadata,
        progress: ProgressFn,
    ) -> Result<UploadReceipt> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video.mp4")
            .to_string();
        let identifier = item_identifier();

        let (body, size) = file_body(path, progress).await?;

        let response = self
            .request(&identifier, &file_name, metadata)
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await
            .map_err(|e| RecorderError::UploadFailed(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RecorderError::UploadFailed(format!(
                "Archive upload failed with status {}: {}",
                status, error_text
            )));
        }

        let link = format!("{}/{}", self.details_url, identifier);
        tracing::info!(
            identifier = %identifier,
            size = size,
            file_name = %file_name,
            "Uploaded recording to archive"
        );

        Ok(UploadReceipt {
            message: format!("Uploaded to {}", link),
            link: Some(link),
        })
    }
}
