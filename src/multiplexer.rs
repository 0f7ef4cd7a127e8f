//! The per-session write loop.
//!
//! Exactly one task writes to a connection. Lines, heartbeat ticks and the
//! termination signal are merged here and turned into frames one at a time,
//! each under its own write deadline.

use std::fmt;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::heartbeat::Heartbeat;
use crate::source::Line;

/// The kinds of frame the server sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// A line of file content.
    Data,
    /// Liveness probe (ping).
    Probe,
    Close,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameKind::Data => "data",
            FrameKind::Probe => "probe",
            FrameKind::Close => "close",
        };
        f.write_str(name)
    }
}

/// Why the write loop stopped.
#[derive(Debug)]
pub enum MuxExit {
    /// Termination was observed; a close frame was attempted.
    Closed,
    /// A frame could not be written; the termination signal has been fired.
    WriteFailed(Error),
}

/// Runs the write loop until termination or the first failed write.
///
/// Heartbeat ticks take priority, then queued lines, then the termination
/// signal. Lines already queued when termination fires are still written, so
/// a failure report enqueued before termination precedes the close frame.
pub async fn run_multiplexer<S, L>(
    sink: &mut S,
    lines: &mut L,
    mut heartbeat: Heartbeat,
    shutdown: &CancellationToken,
    write_timeout: Duration,
) -> MuxExit
where
    S: Sink<Message, Error = axum::Error> + Unpin,
    L: Stream<Item = Line> + Unpin,
{
    loop {
        let (frame, kind) = tokio::select! {
            biased;
            () = heartbeat.tick() => (Message::Ping(Bytes::new()), FrameKind::Probe),
            line = lines.next() => match line {
                Some(line) => (data_frame(line), FrameKind::Data),
                None => break,
            },
            () = shutdown.cancelled() => break,
        };

        trace!(frame = %kind, "writing frame");
        if let Err(e) = write_frame(sink, frame, kind, write_timeout).await {
            debug!(error = %e, "write failed");
            shutdown.cancel();
            return MuxExit::WriteFailed(e);
        }
    }

    shutdown.cancel();
    if let Err(e) = write_frame(sink, Message::Close(None), FrameKind::Close, write_timeout).await {
        debug!(error = %e, "close frame not delivered");
    }
    MuxExit::Closed
}

fn data_frame(line: Line) -> Message {
    match String::from_utf8(line.into_bytes()) {
        Ok(text) => Message::Text(text.into()),
        Err(e) => Message::Binary(e.into_bytes().into()),
    }
}

async fn write_frame<S>(sink: &mut S, frame: Message, kind: FrameKind, deadline: Duration) -> Result<()>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match tokio::time::timeout(deadline, sink.send(frame)).await {
        Ok(sent) => Ok(sent?),
        Err(_) => Err(Error::WriteTimeout { frame: kind }),
    }
}
