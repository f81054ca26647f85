//! Per-connection WebSocket session.
//!
//! One task per connection drives both directions: inbound text frames are
//! broadcast in arrival order, frames queued by peers are written out in
//! batches with a bounded send time.

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::hub::{ConnectionHandle, ConnectionId, Relay};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent a close frame or the stream ended
    Closed,
    /// Removed by the relay (queue full or closed)
    Evicted,
    /// Relay is shutting down
    Shutdown,
    /// Client sent a binary frame
    Unsupported,
    ReadError(String),
    SendFailed(String),
    SendTimeout,
}

impl SessionEnd {
    /// Close frame to send on the way out, if the transport is still usable.
    fn close_frame(&self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            Self::Evicted => (close_code::POLICY, "too slow to keep up"),
            Self::Shutdown => (close_code::AWAY, "server shutting down"),
            Self::Unsupported => (close_code::UNSUPPORTED, "only text frames are relayed"),
            Self::Closed | Self::ReadError(_) | Self::SendFailed(_) | Self::SendTimeout => {
                return None;
            }
        };
        Some(CloseFrame {
            code,
            reason: reason.into(),
        })
    }

    fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::ReadError(_) | Self::SendFailed(_) | Self::SendTimeout
        )
    }
}

/// Register an upgraded socket with the relay and run it until it ends.
pub async fn serve_connection(relay: Arc<Relay>, socket: WebSocket) -> SessionEnd {
    let handle = relay.accept();
    run_receive_loop(handle, socket).await
}

/// Drive one connection until it closes, errors, or is cancelled.
///
/// Reading and writing progress independently inside the same task: a
/// broadcast that is waiting on a full peer never stops this connection's
/// own queue from draining, and a steady stream of outbound frames never
/// starves the inbound side. The handle is dropped (deregistering the
/// connection) before the socket halves are released, on every exit path.
pub async fn run_receive_loop(mut handle: ConnectionHandle, socket: WebSocket) -> SessionEnd {
    let conn_id = handle.id();
    let relay = handle.relay().clone();
    let cancel = handle.cancel_token();
    let send_timeout = relay.config().send_timeout;
    let max_batch = relay.config().outbound_queue;
    let connected_at = handle.connected_at();

    let (mut sink, mut stream) = socket.split();

    let end = tokio::select! {
        _ = cancel.cancelled() => {
            if relay.is_shutting_down() {
                SessionEnd::Shutdown
            } else {
                SessionEnd::Evicted
            }
        }
        end = write_outbound(&mut handle, &mut sink, max_batch, send_timeout) => end,
        end = read_inbound(&mut stream, &relay, conn_id) => end,
    };

    drop(handle);

    if let Some(frame) = end.close_frame() {
        let _ = write_frame(&mut sink, Message::Close(Some(frame)), send_timeout).await;
    }

    if end.is_transport_error() {
        relay.metrics().transport_error();
        warn!(conn_id = %conn_id, reason = ?end, "Connection ended with transport error");
    }

    let duration_secs = (chrono::Utc::now() - connected_at).num_seconds().max(0);
    info!(
        conn_id = %conn_id,
        reason = ?end,
        duration_secs,
        active = relay.active_count(),
        "Connection left relay"
    );

    end
}

/// Broadcast every inbound text frame, in arrival order.
async fn read_inbound<S>(stream: &mut S, relay: &Relay, conn_id: ConnectionId) -> SessionEnd
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let report = relay.broadcast(conn_id, text).await;
                debug!(conn_id = %conn_id, delivered = report.delivered, evicted = report.evicted, "Relayed message");
            }
            Some(Ok(Message::Binary(_))) => {
                relay.metrics().binary_rejected();
                return SessionEnd::Unsupported;
            }
            Some(Ok(Message::Close(_))) | None => return SessionEnd::Closed,
            // Pings are answered by the transport
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Err(e)) => return SessionEnd::ReadError(e.to_string()),
        }
    }
}

/// Write queued frames to the client.
///
/// Whatever is already queued (up to one queue's worth) goes out as one batch
/// with a single flush; the send timeout bounds each batch.
async fn write_outbound<S>(
    handle: &mut ConnectionHandle,
    sink: &mut S,
    max_batch: usize,
    send_timeout: Option<Duration>,
) -> SessionEnd
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    loop {
        let Some(first) = handle.recv().await else {
            return SessionEnd::Evicted;
        };
        let batch = async {
            sink.feed(Message::Text(first)).await?;
            for _ in 1..max_batch {
                let Some(next) = handle.try_recv() else {
                    break;
                };
                sink.feed(Message::Text(next)).await?;
            }
            sink.flush().await
        };
        if let Err(end) = bounded(batch, send_timeout).await {
            return end;
        }
    }
}

async fn write_frame<S>(
    sink: &mut S,
    message: Message,
    send_timeout: Option<Duration>,
) -> Result<(), SessionEnd>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    bounded(sink.send(message), send_timeout).await
}

async fn bounded<F>(write: F, send_timeout: Option<Duration>) -> Result<(), SessionEnd>
where
    F: Future<Output = Result<(), axum::Error>>,
{
    let result = match send_timeout {
        Some(limit) => match tokio::time::timeout(limit, write).await {
            Ok(result) => result,
            Err(_) => return Err(SessionEnd::SendTimeout),
        },
        None => write.await,
    };
    result.map_err(|e| SessionEnd::SendFailed(e.to_string()))
}
