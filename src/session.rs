//! Session bootstrap and teardown for one connected client.

use std::fmt;

use axum::extract::ws::Message;
use futures::{Sink, Stream};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::{SessionConfig, SourcePaths};
use crate::heartbeat::Heartbeat;
use crate::hint::ResumeHint;
use crate::monitor::{MonitorExit, run_monitor};
use crate::multiplexer::{MuxExit, run_multiplexer};
use crate::stream::LineStream;

/// Lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Streaming,
    Closing,
    Closed,
}

/// What ended a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The source could not be opened or read.
    SourceFailed,
    /// A frame could not be written in time.
    WriteFailed,
    /// The client closed the connection.
    PeerClosed,
    /// The client stopped answering probes.
    LivenessExpired,
    /// Reading from the client failed.
    ReadFailed,
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::SourceFailed => "source failed",
            CloseReason::WriteFailed => "write failed",
            CloseReason::PeerClosed => "peer closed",
            CloseReason::LivenessExpired => "liveness expired",
            CloseReason::ReadFailed => "read failed",
            CloseReason::Shutdown => "server shutdown",
        };
        f.write_str(reason)
    }
}

/// Final report of a finished session.
#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub id: Uuid,
    pub state: SessionState,
    pub reason: CloseReason,
    pub resume_hint: ResumeHint,
}

struct Session {
    id: Uuid,
    resume_hint: ResumeHint,
    state: SessionState,
    shutdown: CancellationToken,
}

impl Session {
    fn new(resume_hint: ResumeHint, parent: &CancellationToken) -> Self {
        Self {
            id: Uuid::now_v7(),
            resume_hint,
            state: SessionState::Open,
            shutdown: parent.child_token(),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }
}

/// Runs one client session to completion.
///
/// Spawns the line producer and the write loop, then reads from the client
/// on the calling task. Returns once the read loop has exited, the close
/// frame has been attempted, and the producer has released the source.
/// Cancelling `parent` terminates the session.
pub async fn run_session<S, R>(
    mut sink: S,
    mut stream: R,
    sources: SourcePaths,
    config: &SessionConfig,
    resume_hint: ResumeHint,
    parent: &CancellationToken,
) -> SessionSummary
where
    S: Sink<Message, Error = axum::Error> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut session = Session::new(resume_hint, parent);
    let span = info_span!("session", id = %session.id);

    async move {
        info!(resume_hint = %session.resume_hint, "client connected");

        let shutdown = session.shutdown.clone();
        let mut lines = LineStream::spawn(sources, config, shutdown.clone());
        let heartbeat = Heartbeat::new(config.heartbeat_period());
        let write_timeout = config.write_timeout();

        let mux_shutdown = shutdown.clone();
        let writer = tokio::spawn(
            async move {
                let exit =
                    run_multiplexer(&mut sink, &mut lines, heartbeat, &mux_shutdown, write_timeout)
                        .await;
                (exit, lines)
            }
            .in_current_span(),
        );
        session.transition(SessionState::Streaming);

        let monitor_exit = run_monitor(&mut stream, config.liveness_timeout(), &shutdown).await;
        session.transition(SessionState::Closing);

        let mux_exit = match writer.await {
            Ok((exit, lines)) => {
                lines.shutdown().await;
                Some(exit)
            }
            Err(e) => {
                warn!(error = %e, "write loop did not exit cleanly");
                None
            }
        };
        session.transition(SessionState::Closed);

        let reason = close_reason(&monitor_exit, mux_exit.as_ref(), parent.is_cancelled());
        info!(%reason, "session closed");

        SessionSummary {
            id: session.id,
            state: session.state,
            reason,
            resume_hint: session.resume_hint,
        }
    }
    .instrument(span)
    .await
}

/// Picks the first cause: the read side reports its own failures, otherwise
/// the termination came from the write loop, the source, or the server.
fn close_reason(
    monitor: &MonitorExit,
    mux: Option<&MuxExit>,
    server_shutdown: bool,
) -> CloseReason {
    match monitor {
        MonitorExit::PeerClosed => CloseReason::PeerClosed,
        MonitorExit::LivenessExpired => CloseReason::LivenessExpired,
        MonitorExit::ReadFailed(_) => CloseReason::ReadFailed,
        MonitorExit::Terminated => match mux {
            Some(MuxExit::WriteFailed(_)) | None => CloseReason::WriteFailed,
            Some(MuxExit::Closed) if server_shutdown => CloseReason::Shutdown,
            Some(MuxExit::Closed) => CloseReason::SourceFailed,
        },
    }
}
