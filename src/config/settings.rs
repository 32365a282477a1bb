//! Operator-editable settings document.
//!
//! Settings live in the State Store as `settings.json`. Loading is
//! forward-compatible: keys missing from an older document are backfilled
//! from defaults, and keys this build does not know about are carried
//! through untouched so a save never drops them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::{RecorderError, Result};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Container format the capture tool is asked to write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    #[default]
    Mp4,
    Ts,
    Mkv,
}

impl CaptureFormat {
    /// Extensions recognized as recordings when scanning the data directory
    pub const VIDEO_EXTENSIONS: [&'static str; 3] = ["mp4", "ts", "mkv"];

    pub fn extension(self) -> &'static str {
        match self {
            CaptureFormat::Mp4 => "mp4",
            CaptureFormat::Ts => "ts",
            CaptureFormat::Mkv => "mkv",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mp4" => Some(CaptureFormat::Mp4),
            "ts" => Some(CaptureFormat::Ts),
            "mkv" => Some(CaptureFormat::Mkv),
            _ => None,
        }
    }
}

// An unknown format must not invalidate the whole document (and with it the
// stored credentials), so it degrades to the default instead of failing.
impl<'de> Deserialize<'de> for CaptureFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let parsed = raw.as_str().and_then(CaptureFormat::parse);
        Ok(parsed.unwrap_or_else(|| {
            tracing::warn!(format = %raw, "Unknown capture format in settings, using default");
            CaptureFormat::default()
        }))
    }
}

// Recognized keys degrade one at a time, like `CaptureFormat`: a single
// mistyped value never fails the whole document.

fn lenient_interval<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    let seconds = match &raw {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_seconds)),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(whole_seconds),
        _ => None,
    };
    Ok(seconds.unwrap_or_else(|| {
        tracing::warn!(value = %raw, "Invalid poll interval in settings, using default");
        DEFAULT_POLL_INTERVAL_SECS
    }))
}

fn whole_seconds(value: f64) -> Option<u64> {
    value.is_finite().then(|| value.max(0.0).round() as u64)
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(match &raw {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        Value::Null => false,
        _ => {
            tracing::warn!(value = %raw, "Invalid flag in settings, using false");
            false
        }
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(match raw {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => {
            tracing::warn!(value = %other, "Invalid credential in settings, ignoring");
            String::new()
        }
    })
}

/// Deserializes a nested target, degrading to the default when the value
/// is not an object at all.
fn lenient_target<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let raw = Value::deserialize(deserializer)?;
    match serde_json::from_value(raw) {
        Ok(target) => Ok(target),
        Err(e) => {
            tracing::warn!(error = %e, "Invalid upload target in settings, using default");
            Ok(T::default())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArchiveTarget {
    #[serde(default, deserialize_with = "lenient_string")]
    pub access_key: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub secret_key: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArchiveTarget {
    pub fn has_credentials(&self) -> bool {
        !self.access_key.trim().is_empty() && !self.secret_key.trim().is_empty()
    }
}

fn empty_string_value() -> Value {
    Value::String(String::new())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoPlatformTarget {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub enabled: bool,
    /// OAuth client configuration, either inline JSON or a JSON string
    #[serde(default = "empty_string_value", alias = "client_secrets")]
    pub client_credentials: Value,
    /// Authorized token, either inline JSON or a JSON string
    #[serde(default = "empty_string_value", alias = "token")]
    pub auth_token: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for VideoPlatformTarget {
    fn default() -> Self {
        Self {
            enabled: false,
            client_credentials: empty_string_value(),
            auth_token: empty_string_value(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UploadTargets {
    #[serde(default, deserialize_with = "lenient_target")]
    pub archive: ArchiveTarget,
    #[serde(default, alias = "youtube", deserialize_with = "lenient_target")]
    pub video_platform: VideoPlatformTarget,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(
        default = "default_poll_interval",
        alias = "check_interval",
        deserialize_with = "lenient_interval"
    )]
    pub poll_interval_seconds: u64,
    #[serde(default, alias = "recording_format")]
    pub capture_format: CaptureFormat,
    #[serde(default, deserialize_with = "lenient_target")]
    pub upload_targets: UploadTargets,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
            capture_format: CaptureFormat::default(),
            upload_targets: UploadTargets::default(),
            extra: Map::new(),
        }
    }
}

/// Partial update sent by the operator
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, alias = "check_interval")]
    pub poll_interval_seconds: Option<u64>,
    #[serde(default, alias = "recording_format")]
    pub capture_format: Option<String>,
    /// Per-target objects merged key by key into the stored targets
    #[serde(default)]
    pub upload_targets: Option<Map<String, Value>>,
}

impl Settings {
    /// Poll interval to sleep after each supervisor cycle (never below 1s)
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    /// Merges an operator patch into these settings.
    pub fn apply(&mut self, patch: SettingsPatch) -> Result<()> {
        if let Some(interval) = patch.poll_interval_seconds {
            self.poll_interval_seconds = interval.max(1);
        }

        if let Some(format) = patch.capture_format {
            self.capture_format = CaptureFormat::parse(&format).ok_or_else(|| {
                RecorderError::InvalidRequest(format!("Unknown capture format: {}", format))
            })?;
        }

        if let Some(targets) = patch.upload_targets {
            let mut current = match serde_json::to_value(&self.upload_targets)? {
                Value::Object(map) => map,
                _ => Map::new(),
            };

            for (target, update) in targets {
                let Value::Object(update) = update else {
                    return Err(RecorderError::InvalidRequest(format!(
                        "upload_targets.{} must be an object",
                        target
                    )));
                };
                let target = match target.as_str() {
                    "youtube" => "video_platform".to_string(),
                    _ => target,
                };
                let entry = current
                    .entry(target)
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                if let Value::Object(existing) = entry {
                    existing.extend(update);
                }
            }

            self.upload_targets = serde_json::from_value(Value::Object(current)).map_err(|e| {
                RecorderError::InvalidRequest(format!("Invalid upload target settings: {}", e))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_keys_are_backfilled() {
        let settings: Settings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.poll_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_legacy_keys_are_understood() {
        let settings: Settings = serde_json::from_value(json!({
            "check_interval": 30,
            "recording_format": "ts",
            "upload_targets": {
                "youtube": { "enabled": true, "token": "{\"token\": \"abc\"}" },
                "drive": { "enabled": false }
            }
        }))
        .unwrap();

        assert_eq!(settings.poll_interval_seconds, 30);
        assert_eq!(settings.capture_format, CaptureFormat::Ts);
        assert!(settings.upload_targets.video_platform.enabled);
        assert!(settings.upload_targets.extra.contains_key("drive"));
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let original = json!({
            "poll_interval_seconds": 20,
            "capture_format": "mkv",
            "theme": "dark",
            "upload_targets": {
                "archive": { "access_key": "a", "secret_key": "b", "collection": "streams" }
            }
        });

        let settings: Settings = serde_json::from_value(original).unwrap();
        let saved = serde_json::to_value(&settings).unwrap();

        assert_eq!(saved["theme"], "dark");
        assert_eq!(saved["poll_interval_seconds"], 20);
        assert_eq!(saved["capture_format"], "mkv");
        assert_eq!(saved["upload_targets"]["archive"]["collection"], "streams");
        assert_eq!(saved["upload_targets"]["archive"]["access_key"], "a");

        let reloaded: Settings = serde_json::from_value(saved).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn test_unknown_capture_format_degrades_to_default() {
        let settings: Settings = serde_json::from_value(json!({
            "capture_format": "flv",
            "upload_targets": { "archive": { "access_key": "kept", "secret_key": "kept" } }
        }))
        .unwrap();

        assert_eq!(settings.capture_format, CaptureFormat::Mp4);
        assert!(settings.upload_targets.archive.has_credentials());
    }

    #[test]
    fn test_mistyped_keys_do_not_discard_the_document() {
        let settings: Settings = serde_json::from_value(json!({
            "poll_interval_seconds": "30",
            "theme": "dark",
            "upload_targets": {
                "archive": { "access_key": "AK", "secret_key": "SK" },
                "video_platform": { "enabled": "true", "auth_token": "tok" }
            }
        }))
        .unwrap();

        assert_eq!(settings.poll_interval_seconds, 30);
        assert_eq!(settings.extra["theme"], "dark");
        assert_eq!(settings.upload_targets.archive.access_key, "AK");
        assert_eq!(settings.upload_targets.archive.secret_key, "SK");
        assert!(settings.upload_targets.video_platform.enabled);
    }

    #[test]
    fn test_invalid_values_degrade_per_field() {
        let settings: Settings = serde_json::from_value(json!({
            "poll_interval_seconds": -5,
            "capture_format": 7,
            "theme": "dark",
            "upload_targets": {
                "archive": { "access_key": 12345, "secret_key": ["x"] },
                "video_platform": "broken"
            }
        }))
        .unwrap_or_else(|e| panic!("document rejected: {}", e));

        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
        assert_eq!(settings.extra["theme"], "dark");
        assert_eq!(settings.upload_targets.archive.access_key, "12345");
        assert_eq!(settings.upload_targets.archive.secret_key, "");
        assert_eq!(settings.upload_targets.video_platform, VideoPlatformTarget::default());

        let interval: Settings = serde_json::from_value(json!({ "check_interval": {"s": 1} })).unwrap();
        assert_eq!(interval.poll_interval_seconds, DEFAULT_POLL_INTERVAL_SECS);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let settings = Settings {
            poll_interval_seconds: 0,
            ..Settings::default()
        };
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_apply_merges_targets_key_by_key() {
        let mut settings = Settings::default();
        settings.upload_targets.archive.access_key = "old-access".to_string();
        settings.upload_targets.archive.secret_key = "old-secret".to_string();

        let patch: SettingsPatch = serde_json::from_value(json!({
            "poll_interval_seconds": 60,
            "capture_format": "ts",
            "upload_targets": {
                "archive": { "secret_key": "new-secret" },
                "video_platform": { "enabled": true }
            }
        }))
        .unwrap();

        settings.apply(patch).unwrap();

        assert_eq!(settings.poll_interval_seconds, 60);
        assert_eq!(settings.capture_format, CaptureFormat::Ts);
        assert_eq!(settings.upload_targets.archive.access_key, "old-access");
        assert_eq!(settings.upload_targets.archive.secret_key, "new-secret");
        assert!(settings.upload_targets.video_platform.enabled);
    }

    #[test]
    fn test_apply_rejects_unknown_format() {
        let mut settings = Settings::default();
        let patch = SettingsPatch {
            capture_format: Some("avi".to_string()),
            ..SettingsPatch::default()
        };
        assert!(matches!(
            settings.apply(patch),
            Err(RecorderError::InvalidRequest(_))
        ));
    }
}
