//! Liveness probing of watched sources.
//!
//! A probe answers one question per call: is the source live right now,
//! and with which capture parameters. Transient failures come back as
//! [`ProbeOutcome::Unknown`] and callers treat them exactly like
//! [`ProbeOutcome::Offline`] for the current cycle.

mod streamlink;

pub use streamlink::StreamlinkProber;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the capture subprocess needs to record a live source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDescriptor {
    pub url: String,
    pub quality: String,
    /// Variants reported by the resolver, for logging
    pub qualities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Live(CaptureDescriptor),
    Offline,
    /// Network, timeout or tool failure; retried next cycle
    Unknown(String),
}

impl ProbeOutcome {
    pub fn is_live(&self) -> bool {
        matches!(self, ProbeOutcome::Live(_))
    }
}

pub const PLACEHOLDER_TITLE: &str = "Unknown Title";
pub const PLACEHOLDER_GAME: &str = "Unknown Game";

/// Human-readable stream details stored next to a recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub title: String,
    pub game: String,
    pub author: String,
}

impl StreamMetadata {
    pub fn placeholder(source: &str) -> Self {
        Self {
            title: PLACEHOLDER_TITLE.to_string(),
            game: PLACEHOLDER_GAME.to_string(),
            author: source.to_string(),
        }
    }

    /// Extracts metadata from the tool's JSON output. Missing fields keep
    /// their placeholder.
    pub fn from_tool_output(output: &Value, source: &str) -> Self {
        let mut meta = Self::placeholder(source);
        let Some(fields) = output.get("metadata").and_then(Value::as_object) else {
            return meta;
        };

        let text = |key: &str| {
            fields
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if let Some(title) = text("title") {
            meta.title = title;
        }
        if let Some(game) = text("category").or_else(|| text("game")) {
            meta.game = game;
        }
        if let Some(author) = text("author") {
            meta.author = author;
        }
        meta
    }
}

#[async_trait]
pub trait LivenessProber: Send + Sync {
    /// Resolves a source to its live state. Must complete within a bounded
    /// interval and never panic on tool failure.
    async fn probe(&self, source: &str) -> ProbeOutcome;

    /// Best-effort metadata lookup; degrades to placeholders on any failure.
    async fn fetch_metadata(&self, source: &str) -> StreamMetadata;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_from_full_output() {
        let output = json!({
            "plugin": "twitch",
            "metadata": {
                "id": "123",
                "author": "Alpha",
                "category": "Just Chatting",
                "title": "Morning stream"
            },
            "streams": {}
        });

        let meta = StreamMetadata::from_tool_output(&output, "alpha");
        assert_eq!(meta.title, "Morning stream");
        assert_eq!(meta.game, "Just Chatting");
        assert_eq!(meta.author, "Alpha");
    }

    #[test]
    fn test_metadata_partial_output_keeps_placeholders() {
        let output = json!({ "metadata": { "title": "  ", "game": "Chess" } });

        let meta = StreamMetadata::from_tool_output(&output, "alpha");
        assert_eq!(meta.title, PLACEHOLDER_TITLE);
        assert_eq!(meta.game, "Chess");
        assert_eq!(meta.author, "alpha");
    }

    #[test]
    fn test_metadata_without_metadata_block() {
        let meta = StreamMetadata::from_tool_output(&json!({"error": "offline"}), "beta");
        assert_eq!(meta, StreamMetadata::placeholder("beta"));
    }
}
