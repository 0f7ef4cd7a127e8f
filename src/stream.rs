//! Background producer that feeds source lines into a bounded queue.

use crate::config::{SessionConfig, SourcePaths};
use crate::error::Error;
use crate::source::{Line, LineSource};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, warn};

/// Lines read by a background task, in file order.
///
/// The producer stops when `shutdown` is cancelled. On a source failure it
/// enqueues [`Line::sentinel`] and then cancels `shutdown` itself, so a
/// consumer that prefers queued lines over the shutdown signal always sees
/// the sentinel first.
pub struct LineStream {
    receiver: mpsc::Receiver<Line>,
    shutdown: CancellationToken,
    task_handle: JoinHandle<()>,
}

impl LineStream {
    /// Spawns the producer task for `sources`.
    pub fn spawn(sources: SourcePaths, config: &SessionConfig, shutdown: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);

        let task_config = config.clone();
        let task_shutdown = shutdown.clone();
        let task_handle = tokio::spawn(
            line_producer_task(sources, task_config, tx, task_shutdown).in_current_span(),
        );

        LineStream {
            receiver: rx,
            shutdown,
            task_handle,
        }
    }

    /// Stops the producer and waits for it to release the source.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task_handle.await {
            warn!(error = %e, "line producer did not exit cleanly");
        }
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.task_handle.is_finished()
    }
}

/// Background task that opens the source and forwards its lines
async fn line_producer_task(
    sources: SourcePaths,
    config: SessionConfig,
    tx: mpsc::Sender<Line>,
    shutdown: CancellationToken,
) {
    let opened = tokio::select! {
        () = shutdown.cancelled() => return,
        opened = LineSource::open(&sources, &config) => opened,
    };
    let mut source = match opened {
        Ok(source) => source,
        Err(e) => return fail(e, &tx, &shutdown).await,
    };
    debug!(path = %source.path().display(), "tailing source");

    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = source.next_line() => line,
        };

        match line {
            Ok(line) => {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    sent = tx.send(line) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => return fail(e, &tx, &shutdown).await,
        }
    }

    debug!(path = %source.path().display(), "line producer stopped");
}

async fn fail(error: Error, tx: &mpsc::Sender<Line>, shutdown: &CancellationToken) {
    warn!(error = %error, "source failed, terminating session");
    tokio::select! {
        () = shutdown.cancelled() => {}
        _ = tx.send(Line::sentinel()) => {}
    }
    shutdown.cancel();
}

impl Stream for LineStream {
    type Item = Line;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}
