use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{CaptureDescriptor, LivenessProber, ProbeOutcome, StreamMetadata};
use crate::config::CaptureConfig;
use crate::error::{RecorderError, Result};

/// Error fragments the resolver emits for transport problems rather than
/// for an offline or unsupported source.
const TRANSIENT_ERROR_MARKERS: [&str; 4] = [
    "Unable to open URL",
    "ConnectionError",
    "timed out",
    "Max retries exceeded",
];

/// Prober backed by the capture tool's JSON resolution mode
/// (`<tool> --json <url>`).
#[derive(Debug, Clone)]
pub struct StreamlinkProber {
    config: CaptureConfig,
}

impl StreamlinkProber {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    async fn resolve(&self, source: &str, timeout: Duration) -> Result<Value> {
        let url = self.config.source_url(source);
        let mut command = Command::new(&self.config.tool);
        command
            .arg("--json")
            .arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| {
                RecorderError::ProbeUnavailable(
                    source.to_string(),
                    format!("no answer within {:?}", timeout),
                )
            })?
            .map_err(|e| {
                RecorderError::ProbeUnavailable(
                    source.to_string(),
                    format!("failed to run {}: {}", self.config.tool, e),
                )
            })?;

        // The tool prints a JSON document even when it exits non-zero.
        serde_json::from_slice(&output.stdout).map_err(|e| {
            RecorderError::ProbeUnavailable(
                source.to_string(),
                format!("unreadable resolver output ({}): {}", output.status, e),
            )
        })
    }
}

/// Maps the resolver document to a probe outcome.
pub(crate) fn classify(document: &Value, url: &str, preferred_quality: &str) -> ProbeOutcome {
    if let Some(streams) = document.get("streams").and_then(Value::as_object) {
        if !streams.is_empty() {
            let qualities: Vec<String> = streams.keys().cloned().collect();
            let quality = if streams.contains_key(preferred_quality) {
                preferred_quality.to_string()
            } else {
                "best".to_string()
            };
            return ProbeOutcome::Live(CaptureDescriptor {
                url: url.to_string(),
                quality,
                qualities,
            });
        }
    }

    if let Some(error) = document.get("error").and_then(Value::as_str) {
        if TRANSIENT_ERROR_MARKERS
            .iter()
            .any(|marker| error.contains(marker))
        {
            return ProbeOutcome::Unknown(error.to_string());
        }
    }

    ProbeOutcome::Offline
}

#[async_trait]
impl LivenessProber for StreamlinkProber {
    async fn probe(&self, source: &str) -> ProbeOutcome {
        match self.resolve(source, self.config.probe_timeout).await {
            Ok(document) => classify(
                &document,
                &self.config.source_url(source),
                &self.config.quality,
            ),
            Err(e) => ProbeOutcome::Unknown(e.to_string()),
        }
    }

    async fn fetch_metadata(&self, source: &str) -> StreamMetadata {
        match self.resolve(source, self.config.metadata_timeout).await {
            Ok(document) => StreamMetadata::from_tool_output(&document, source),
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "Metadata fetch failed");
                StreamMetadata::placeholder(source)
            }
        }
    }
}
