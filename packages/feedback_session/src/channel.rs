//! The edit channel: one task per connection that writes code updates out
//! and hands every inbound payload to the feedback relay.
//!
//! Delivery is at-most-once and bounded by the connection's lifetime. Updates
//! still queued when the connection ends are dropped, never replayed on the
//! next connection.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::identity::SubmissionId;
use crate::message::CodeUpdate;
use crate::relay::FeedbackRelay;
use crate::transport::{Connection, FrameSink, FrameStream};

/// Why a channel task stopped.
#[derive(Debug)]
pub(crate) enum ChannelExit {
    /// Closed on request (session teardown).
    Cancelled,
    /// The transport went away underneath us.
    Terminated(TransportError),
}

pub(crate) struct EditChannel {
    outbound: mpsc::UnboundedSender<CodeUpdate>,
    task: JoinHandle<ChannelExit>,
}

impl EditChannel {
    pub(crate) fn start(
        id: SubmissionId,
        connection: Connection,
        relay: FeedbackRelay,
        cancel: CancellationToken,
        close_timeout: Duration,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_channel(
            id,
            connection,
            relay,
            outbound_rx,
            cancel,
            close_timeout,
        ));
        Self { outbound, task }
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<CodeUpdate> {
        self.outbound.clone()
    }

    /// Wait for the channel task to end.
    pub(crate) async fn finished(self) -> ChannelExit {
        drop(self.outbound);
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                warn!("Edit channel task failed: {}", e);
                ChannelExit::Terminated(TransportError::Closed)
            }
        }
    }
}

async fn run_channel(
    id: SubmissionId,
    connection: Connection,
    relay: FeedbackRelay,
    mut outbound_rx: mpsc::UnboundedReceiver<CodeUpdate>,
    cancel: CancellationToken,
    close_timeout: Duration,
) -> ChannelExit {
    let Connection {
        mut sink,
        mut stream,
    } = connection;

    let exit = tokio::select! {
        _ = cancel.cancelled() => ChannelExit::Cancelled,
        res = write_updates(&mut sink, &mut outbound_rx) => match res {
            // Every sender is gone: the session detached this channel.
            Ok(()) => ChannelExit::Cancelled,
            Err(e) => ChannelExit::Terminated(e),
        },
        err = read_feedback(&id, &mut stream, &relay) => ChannelExit::Terminated(err),
    };

    if matches!(exit, ChannelExit::Cancelled) {
        let dropped = drain(&mut outbound_rx);
        if dropped > 0 {
            debug!(
                "Dropped {} unsent update(s) for submission {} on close",
                dropped, id
            );
        }
        if tokio::time::timeout(close_timeout, sink.close()).await.is_err() {
            debug!("Edit channel for submission {} did not close cleanly", id);
        }
    }

    exit
}

async fn write_updates(
    sink: &mut FrameSink,
    outbound_rx: &mut mpsc::UnboundedReceiver<CodeUpdate>,
) -> Result<(), TransportError> {
    while let Some(update) = outbound_rx.recv().await {
        sink.send(update.into_code()).await?;
    }
    Ok(())
}

async fn read_feedback(
    id: &SubmissionId,
    stream: &mut FrameStream,
    relay: &FeedbackRelay,
) -> TransportError {
    let mut delivered: u64 = 0;
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(text) => {
                delivered += 1;
                relay.on_message(text);
            }
            Err(e) => {
                debug!(
                    "Edit channel for submission {} failed after {} message(s)",
                    id, delivered
                );
                return e;
            }
        }
    }
    debug!(
        "Edit channel for submission {} ended after {} message(s)",
        id, delivered
    );
    TransportError::Closed
}

fn drain(rx: &mut mpsc::UnboundedReceiver<CodeUpdate>) -> usize {
    let mut n = 0;
    while rx.try_recv().is_ok() {
        n += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;

    fn pipe() -> (
        Connection,
        fmpsc::UnboundedReceiver<String>,
        fmpsc::UnboundedSender<Result<String, TransportError>>,
    ) {
        let (out_tx, out_rx) = fmpsc::unbounded::<String>();
        let (in_tx, in_rx) = fmpsc::unbounded::<Result<String, TransportError>>();
        let conn = Connection {
            sink: Box::pin(out_tx.sink_map_err(|_| TransportError::Closed)),
            stream: Box::pin(in_rx),
        };
        (conn, out_rx, in_tx)
    }

    #[tokio::test]
    async fn updates_are_written_in_send_order() {
        let (conn, mut server_rx, _server_tx) = pipe();
        let relay = FeedbackRelay::new("-");
        let channel = EditChannel::start(
            SubmissionId::from("1"),
            conn,
            relay,
            CancellationToken::new(),
            Duration::from_millis(50),
        );
        let tx = channel.sender();
        for i in 0..50 {
            tx.send(CodeUpdate::new(format!("line {i}"))).unwrap();
        }
        for i in 0..50 {
            assert_eq!(server_rx.next().await.unwrap(), format!("line {i}"));
        }
    }

    #[tokio::test]
    async fn inbound_payloads_reach_the_relay() {
        let (conn, _server_rx, server_tx) = pipe();
        let relay = FeedbackRelay::new("-");
        let mut watch = relay.subscribe();
        let _channel = EditChannel::start(
            SubmissionId::from("1"),
            conn,
            relay.clone(),
            CancellationToken::new(),
            Duration::from_millis(50),
        );
        server_tx.unbounded_send(Ok("a".into())).unwrap();
        server_tx.unbounded_send(Ok("b".into())).unwrap();
        watch
            .wait_for(|m| m.as_ref().is_some_and(|m| m.text == "b"))
            .await
            .unwrap();
        assert_eq!(relay.current_feedback(), "b");
    }

    #[tokio::test]
    async fn peer_hangup_is_reported_as_termination() {
        let (conn, _server_rx, server_tx) = pipe();
        let channel = EditChannel::start(
            SubmissionId::from("1"),
            conn,
            FeedbackRelay::new("-"),
            CancellationToken::new(),
            Duration::from_millis(50),
        );
        drop(server_tx);
        assert!(matches!(
            channel.finished().await,
            ChannelExit::Terminated(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn inbound_error_is_reported_as_termination() {
        let (conn, _server_rx, server_tx) = pipe();
        let channel = EditChannel::start(
            SubmissionId::from("1"),
            conn,
            FeedbackRelay::new("-"),
            CancellationToken::new(),
            Duration::from_millis(50),
        );
        server_tx
            .unbounded_send(Err(TransportError::Unavailable))
            .unwrap();
        assert!(matches!(
            channel.finished().await,
            ChannelExit::Terminated(TransportError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn cancellation_stops_the_channel() {
        let (conn, mut server_rx, _server_tx) = pipe();
        let cancel = CancellationToken::new();
        let channel = EditChannel::start(
            SubmissionId::from("1"),
            conn,
            FeedbackRelay::new("-"),
            cancel.clone(),
            Duration::from_millis(50),
        );
        cancel.cancel();
        assert!(matches!(channel.finished().await, ChannelExit::Cancelled));
        // sink was closed on the way out
        assert!(server_rx.next().await.is_none());
    }
}
