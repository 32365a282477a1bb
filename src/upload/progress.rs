use futures::stream::{Stream, TryStreamExt};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::ProgressFn;
use crate::error::{RecorderError, Result};

pub const CHUNK_SIZE: usize = 256 * 1024;

/// Percentage rounded to one decimal, 0 when the total is unknown.
pub fn percent(bytes_done: u64, bytes_total: u64) -> f64 {
    if bytes_total == 0 {
        return 0.0;
    }
    let ratio = (bytes_done as f64 / bytes_total as f64).min(1.0);
    (ratio * 1000.0).round() / 10.0
}

async fn open(path: &Path) -> Result<(File, u64)> {
    let file = File::open(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => RecorderError::not_found(format!("File {}", path.display())),
        _ => RecorderError::Io(e),
    })?;
    let total = file.metadata().await?.len();
    Ok((file, total))
}

/// Reads `file` in chunks, reporting `(bytes_done, total)` after every
/// chunk and `(total, total)` once the file is exhausted.
fn chunks(
    file: File,
    total: u64,
    progress: ProgressFn,
) -> impl Stream<Item = std::io::Result<Vec<u8>>> {
    futures::stream::try_unfold((file, 0u64), move |(mut file, done)| {
        let progress = progress.clone();
        async move {
            let mut buffer = vec![0u8; CHUNK_SIZE];
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                progress(total, total);
                return Ok(None);
            }
            buffer.truncate(read);
            let done = done + read as u64;
            progress(done.min(total), total);
            Ok::<_, std::io::Error>(Some((buffer, (file, done))))
        }
    })
}

/// Opens `path` as a streaming request body with progress reporting.
pub async fn file_body(path: &Path, progress: ProgressFn) -> Result<(reqwest::Body, u64)> {
    let (file, total) = open(path).await?;
    let stream = chunks(file, total, progress)
        .inspect_err(|e| tracing::warn!(error = %e, "Upload read failed"));
    Ok((reqwest::Body::wrap_stream(stream), total))
}
