use chrono::{DateTime, Local};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::CaptureFormat;
use crate::error::{RecorderError, Result};
use crate::probe::CaptureDescriptor;
use crate::store::FOLDER_TIMESTAMP_FORMAT;

/// Prefix shared by every recording folder and legacy recording file
pub const RECORDING_PREFIX: &str = "rec_";

/// Where one capture writes its output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLocation {
    /// Folder name inside the data directory; doubles as the artifact id
    pub folder_name: String,
    pub folder: PathBuf,
    pub video_path: PathBuf,
}

fn folder_safe(source: &str) -> String {
    source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Creates a fresh recording folder for `source`.
///
/// Folders are named `rec_<source>_<timestamp>`. The folder is created
/// exclusively, so an existing one (same second, or left over from before a
/// restart) pushes the name to `_2`, `_3`, ... instead of being reused.
pub fn allocate_output(
    root: &Path,
    source: &str,
    at: DateTime<Local>,
    format: CaptureFormat,
) -> Result<OutputLocation> {
    let base = format!(
        "{}{}_{}",
        RECORDING_PREFIX,
        folder_safe(source),
        at.format(FOLDER_TIMESTAMP_FORMAT)
    );

    for attempt in 1..=1000u32 {
        let folder_name = if attempt == 1 {
            base.clone()
        } else {
            format!("{}_{}", base, attempt)
        };
        let folder = root.join(&folder_name);

        match fs::create_dir(&folder) {
            Ok(()) => {
                let video_path = folder.join(format!("video.{}", format.extension()));
                return Ok(OutputLocation {
                    folder_name,
                    folder,
                    video_path,
                });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(RecorderError::internal(format!(
                    "Failed to create recording directory {}: {}",
                    folder.display(),
                    e
                )))
            }
        }
    }

    Err(RecorderError::internal(format!(
        "No free recording directory for {}",
        base
    )))
}

/// Command line of one capture subprocess:
/// `<tool> <source-url> <quality> -o <output-path>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CaptureCommand {
    pub fn new(tool: &str, descriptor: &CaptureDescriptor, output: &Path) -> Self {
        Self {
            program: tool.to_string(),
            args: vec![
                descriptor.url.clone(),
                descriptor.quality.clone(),
                "-o".to_string(),
                output.display().to_string(),
            ],
        }
    }
}
