//! Change notifications for the active source, used to cut the wait between reads.

use crate::error::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Watches the directory holding one file and reports events that touch it.
pub(crate) struct FileWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
    file_name: String,
}

impl FileWatcher {
    /// Starts watching the parent directory of `path`.
    pub(crate) fn watch<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(&watch_dir(path), RecursiveMode::NonRecursive)?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            file_name,
        })
    }

    /// Waits for the next event concerning the watched file.
    ///
    /// Returns `None` once the underlying watcher has shut down.
    pub(crate) async fn changed(&mut self) -> Option<notify::Result<()>> {
        loop {
            match self.receiver.recv().await? {
                Ok(event) if is_event_relevant_to_file(&event, &self.file_name) => {
                    self.drain_pending();
                    return Some(Ok(()));
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Drops events already queued; one wakeup covers them all.
    fn drain_pending(&mut self) {
        while self.receiver.try_recv().is_ok() {}
    }
}

/// Directory to register with notify; bare file names live in the working directory.
fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Check if a notify event is relevant to a specific file
pub(crate) fn is_event_relevant_to_file(event: &Event, target_file_name: &str) -> bool {
    event.paths.iter().any(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy() == target_file_name)
            .unwrap_or(false)
    })
}
