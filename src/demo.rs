//! Synthetic writer that keeps the tailed files growing for demos.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;

/// Line appended to the first file on every tick.
pub const PRIMARY_DEMO_LINE: &str = "hello a\n";
/// Line appended to the second file on every tick.
pub const SECONDARY_DEMO_LINE: &str = "hello b\n";

/// Appends a demo line to each file every `interval` until `shutdown` fires.
///
/// Fails if a file cannot be opened for appending or a write fails.
pub async fn run_demo_writer(
    paths: Vec<PathBuf>,
    interval: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for (path, line) in paths.iter().zip([PRIMARY_DEMO_LINE, SECONDARY_DEMO_LINE]) {
        files.push((open_append(path).await?, line));
    }

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                for (file, line) in &mut files {
                    file.write_all(line.as_bytes()).await?;
                    file.flush().await?;
                }
                debug!(files = files.len(), "demo lines appended");
            }
        }
    }
    Ok(())
}

async fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().append(true).open(path).await?)
}
