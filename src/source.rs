//! Line-by-line reading of an append-only file, with a timed switch to a second file.

use std::future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::config::{SessionConfig, SourcePaths, StartPosition};
use crate::error::{Error, Result};
use crate::watcher::FileWatcher;

/// Text sent to the client in place of a line when the source fails.
pub const SENTINEL_LINE: &str = "Interval error happens, TERMINATE";

/// Which file a line came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineOrigin {
    Primary,
    Secondary,
    /// Produced by the service itself to report a source failure.
    Sentinel,
}

/// One newline-terminated chunk of a source file.
///
/// The bytes are kept exactly as read. Lines that are valid UTF-8 go out as
/// text frames; anything else is sent unchanged as a binary frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    bytes: Vec<u8>,
    origin: LineOrigin,
}

impl Line {
    pub(crate) fn new(bytes: Vec<u8>, origin: LineOrigin) -> Self {
        Self { bytes, origin }
    }

    /// The line reporting a failed source.
    pub fn sentinel() -> Self {
        Self::new(SENTINEL_LINE.as_bytes().to_vec(), LineOrigin::Sentinel)
    }

    /// Raw bytes, delimiter included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn origin(&self) -> LineOrigin {
        self.origin
    }

    /// The line as text, with invalid UTF-8 replaced.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// The secondary file, opened up front and read from its first byte once due.
struct Switchover {
    path: PathBuf,
    reader: BufReader<File>,
    at: Instant,
}

/// Reader over the active source file.
///
/// The source owns its file handle outright. When a secondary path is
/// configured, it is opened together with the primary and its handle takes
/// over once the switchover delay has elapsed, starting from offset 0 so
/// lines written during the delay are not lost. A read in flight at that
/// moment is abandoned together with any partial line, so every line comes
/// from exactly one file.
pub struct LineSource {
    reader: BufReader<File>,
    path: PathBuf,
    origin: LineOrigin,
    partial: Vec<u8>,
    switchover: Option<Switchover>,
    watcher: Option<FileWatcher>,
    poll_interval: Duration,
}

impl LineSource {
    /// Opens the primary file and, if configured, the secondary file and its
    /// switchover timer. A secondary that cannot be opened disables the switch.
    pub async fn open(sources: &SourcePaths, config: &SessionConfig) -> Result<Self> {
        let reader = open_reader(&sources.primary, config.start_position).await?;
        let switchover = match &sources.secondary {
            Some(path) => arm_switchover(path, config.switchover_delay()).await,
            None => None,
        };

        Ok(Self {
            reader,
            path: sources.primary.clone(),
            origin: LineOrigin::Primary,
            partial: Vec::new(),
            switchover,
            watcher: try_watch(&sources.primary),
            poll_interval: config.poll_interval(),
        })
    }

    /// Path of the file currently being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> LineOrigin {
        self.origin
    }

    /// Waits for the next complete line.
    ///
    /// Reaching the end of the file is not an error: partial bytes are kept
    /// and the read is retried once the file changes or the poll interval
    /// elapses.
    pub async fn next_line(&mut self) -> Result<Line> {
        loop {
            if self.switchover_due() {
                self.switch_over();
            }
            let switch_at = self.switchover.as_ref().map(|s| s.at);

            let read = tokio::select! {
                biased;
                () = sleep_until(switch_at) => None,
                read = self.reader.read_until(b'\n', &mut self.partial) => Some(read),
            };

            match read {
                None => continue,
                Some(Ok(_)) if self.partial.ends_with(b"\n") => {
                    let bytes = std::mem::take(&mut self.partial);
                    return Ok(Line::new(bytes, self.origin));
                }
                Some(Ok(_)) => self.wait_for_growth(switch_at).await,
                Some(Err(source)) => {
                    return Err(Error::SourceRead {
                        path: self.path.clone(),
                        source,
                    });
                }
            }
        }
    }

    fn switchover_due(&self) -> bool {
        self.switchover
            .as_ref()
            .is_some_and(|s| Instant::now() >= s.at)
    }

    fn switch_over(&mut self) {
        let Some(switchover) = self.switchover.take() else {
            return;
        };

        let discarded = self.partial.len();
        self.partial.clear();
        self.reader = switchover.reader;
        self.watcher = try_watch(&switchover.path);
        debug!(
            from = %self.path.display(),
            to = %switchover.path.display(),
            discarded,
            "switched source"
        );
        self.path = switchover.path;
        self.origin = LineOrigin::Secondary;
    }

    async fn wait_for_growth(&mut self, switch_at: Option<Instant>) {
        let woke = tokio::select! {
            () = time::sleep(self.poll_interval) => None,
            () = sleep_until(switch_at) => None,
            changed = watcher_changed(&mut self.watcher) => Some(changed),
        };

        match woke {
            Some(Some(Err(e))) => {
                warn!(error = %e, "file watcher failed, polling instead");
                self.watcher = None;
            }
            Some(None) => self.watcher = None,
            _ => {}
        }
    }
}

async fn open_reader(path: &Path, start: StartPosition) -> Result<BufReader<File>> {
    let open_error = |source| Error::SourceOpen {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).await.map_err(open_error)?;
    if start == StartPosition::End {
        file.seek(SeekFrom::End(0)).await.map_err(open_error)?;
    }
    Ok(BufReader::new(file))
}

async fn arm_switchover(path: &Path, delay: Duration) -> Option<Switchover> {
    match open_reader(path, StartPosition::Beginning).await {
        Ok(reader) => Some(Switchover {
            path: path.to_path_buf(),
            reader,
            at: Instant::now() + delay,
        }),
        Err(e) => {
            warn!(error = %e, "secondary source unavailable, no switchover");
            None
        }
    }
}

fn try_watch(path: &Path) -> Option<FileWatcher> {
    match FileWatcher::watch(path) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no change notifications, polling");
            None
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn watcher_changed(watcher: &mut Option<FileWatcher>) -> Option<notify::Result<()>> {
    match watcher {
        Some(watcher) => watcher.changed().await,
        None => future::pending().await,
    }
}
