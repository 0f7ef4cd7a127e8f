//! The per-session read loop: pong-driven liveness and disconnect detection.

use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::Error;

/// Why the read loop stopped.
#[derive(Debug)]
pub enum MonitorExit {
    /// The client sent a close frame or the connection ended.
    PeerClosed,
    /// No pong arrived within the liveness timeout.
    LivenessExpired,
    /// The transport reported an error, including oversize messages.
    ReadFailed(Error),
    /// The session was terminated from elsewhere.
    Terminated,
}

/// Reads from the client until it disappears or the session terminates.
///
/// The read deadline starts at `now + liveness_timeout` and moves forward
/// by the same amount on every pong. Other inbound frames are discarded.
/// The termination signal is fired on every exit path.
pub async fn run_monitor<R>(
    stream: &mut R,
    liveness_timeout: Duration,
    shutdown: &CancellationToken,
) -> MonitorExit
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let exit = read_until_gone(stream, liveness_timeout, shutdown).await;
    debug!(?exit, "read loop finished");
    shutdown.cancel();
    exit
}

async fn read_until_gone<R>(
    stream: &mut R,
    liveness_timeout: Duration,
    shutdown: &CancellationToken,
) -> MonitorExit
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut deadline = Instant::now() + liveness_timeout;

    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => return MonitorExit::Terminated,
            next = time::timeout_at(deadline, stream.next()) => next,
        };

        match next {
            Err(_) => return MonitorExit::LivenessExpired,
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => return MonitorExit::PeerClosed,
            Ok(Some(Err(e))) => return MonitorExit::ReadFailed(e.into()),
            Ok(Some(Ok(Message::Pong(_)))) => {
                trace!("pong received");
                deadline = Instant::now() + liveness_timeout;
            }
            Ok(Some(Ok(_))) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use futures::channel::mpsc as fmpsc;
    use futures::stream;
    use std::io;

    const LIVENESS: Duration = Duration::from_secs(60);

    type Inbound = fmpsc::UnboundedSender<Result<Message, axum::Error>>;

    fn pong() -> Result<Message, axum::Error> {
        Ok(Message::Pong(Bytes::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_expires_after_liveness_timeout() {
        let mut inbound = stream::pending::<Result<Message, axum::Error>>();
        let shutdown = CancellationToken::new();
        let start = Instant::now();

        let exit = run_monitor(&mut inbound, LIVENESS, &shutdown).await;

        assert!(matches!(exit, MonitorExit::LivenessExpired));
        assert_eq!(start.elapsed(), LIVENESS);
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pongs_extend_the_deadline() {
        let (tx, mut rx) = fmpsc::unbounded();
        let shutdown = CancellationToken::new();
        let start = Instant::now();

        let feeder = tokio::spawn(async move {
            let tx: Inbound = tx;
            for _ in 0..3 {
                time::sleep(Duration::from_secs(50)).await;
                tx.unbounded_send(pong()).unwrap();
            }
            // Keep the stream open but silent.
            time::sleep(Duration::from_secs(3600)).await;
            drop(tx);
        });

        let exit = run_monitor(&mut rx, LIVENESS, &shutdown).await;

        assert!(matches!(exit, MonitorExit::LivenessExpired));
        assert_eq!(start.elapsed(), Duration::from_secs(150) + LIVENESS);
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_frames_do_not_extend_the_deadline() {
        let (tx, mut rx) = fmpsc::unbounded();
        let shutdown = CancellationToken::new();
        let start = Instant::now();

        let feeder = tokio::spawn(async move {
            let tx: Inbound = tx;
            time::sleep(Duration::from_secs(30)).await;
            tx.unbounded_send(Ok(Message::Text("hi".into()))).unwrap();
            time::sleep(Duration::from_secs(3600)).await;
            drop(tx);
        });

        let exit = run_monitor(&mut rx, LIVENESS, &shutdown).await;

        assert!(matches!(exit, MonitorExit::LivenessExpired));
        assert_eq!(start.elapsed(), LIVENESS);
        feeder.abort();
    }

    #[tokio::test]
    async fn test_close_frame_means_peer_closed() {
        let mut inbound = stream::iter(vec![pong(), Ok(Message::Close(None))]);
        let shutdown = CancellationToken::new();

        let exit = run_monitor(&mut inbound, LIVENESS, &shutdown).await;
        assert!(matches!(exit, MonitorExit::PeerClosed));
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_end_of_stream_means_peer_closed() {
        let mut inbound = stream::iter(Vec::<Result<Message, axum::Error>>::new());
        let shutdown = CancellationToken::new();

        let exit = run_monitor(&mut inbound, LIVENESS, &shutdown).await;
        assert!(matches!(exit, MonitorExit::PeerClosed));
    }

    #[tokio::test]
    async fn test_transport_error_ends_monitor() {
        let error = axum::Error::new(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let mut inbound = stream::iter(vec![Err(error)]);
        let shutdown = CancellationToken::new();

        let exit = run_monitor(&mut inbound, LIVENESS, &shutdown).await;
        assert!(matches!(exit, MonitorExit::ReadFailed(Error::Transport(_))));
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_termination_stops_monitor() {
        let mut inbound = stream::pending::<Result<Message, axum::Error>>();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let exit = run_monitor(&mut inbound, LIVENESS, &shutdown).await;
        assert!(matches!(exit, MonitorExit::Terminated));
    }
}
