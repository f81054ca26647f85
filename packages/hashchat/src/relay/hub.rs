//! Live connection set and broadcast fan-out.
//!
//! All membership changes and broadcast snapshots go through one lock. The
//! lock is never held across an await point or a send: broadcast clones the
//! recipient queues under the read lock, releases it, then enqueues. A full
//! queue is waited on for at most the configured send timeout; only a
//! recipient that stays full that long is evicted.

use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::metrics::{MetricsSnapshot, RelayMetrics};

/// Process-unique identifier for one accepted connection
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Live-set entry: the delivery side of a connection's outbound queue.
struct Peer {
    outbound: mpsc::Sender<Utf8Bytes>,
    cancel: CancellationToken,
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients the message was enqueued for
    pub delivered: usize,
    /// Recipients removed because their queue stayed full or was closed
    pub evicted: usize,
}

pub struct Relay {
    peers: RwLock<HashMap<ConnectionId, Peer>>,
    next_id: AtomicU64,
    shutting_down: AtomicBool,
    config: RelayConfig,
    metrics: Arc<RelayMetrics>,
}

impl Relay {
    pub fn new(config: RelayConfig, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Counters plus the live-set size at the time of the call.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.active_count())
    }

    // A panic while holding the guard cannot leave the map half-updated
    // (every mutation is a single insert/remove/drain), so poison is ignored.
    fn read_peers(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Peer>> {
        self.peers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_peers(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Peer>> {
        self.peers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection in the live set.
    ///
    /// Call only after the transport handshake succeeded. The returned handle
    /// removes the connection from the live set when dropped. After
    /// [`Relay::shutdown`] the handle comes back already cancelled and the
    /// connection is never registered.
    pub fn accept(self: &Arc<Self>) -> ConnectionHandle {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (outbound, inbox) = mpsc::channel(self.config.outbound_queue.max(1));
        let cancel = CancellationToken::new();

        let active = {
            let mut peers = self.write_peers();
            // Checked under the lock so shutdown's drain cannot miss us.
            if self.shutting_down.load(Ordering::Acquire) {
                cancel.cancel();
                None
            } else {
                peers.insert(
                    id,
                    Peer {
                        outbound,
                        cancel: cancel.clone(),
                    },
                );
                self.metrics.connection_opened();
                Some(peers.len())
            }
        };

        match active {
            Some(active) => info!(conn_id = %id, active, "Connection joined relay"),
            None => debug!(conn_id = %id, "Relay shutting down, connection not registered"),
        }

        ConnectionHandle {
            id,
            relay: Arc::clone(self),
            inbox,
            cancel,
            connected_at: Utc::now(),
        }
    }

    /// Enqueue `message` for every live connection except `sender`.
    ///
    /// Never fails. Recipients with room are served immediately. Recipients
    /// whose queue is full are waited on together, each for at most the send
    /// timeout; one that is still full afterwards (stalled reader), or whose
    /// queue is closed (session already gone), is removed from the live set
    /// and its session cancelled. Everyone else still gets the message.
    ///
    /// Callers broadcast one message at a time, which keeps each sender's
    /// messages in order at every recipient.
    pub async fn broadcast(&self, sender: ConnectionId, message: Utf8Bytes) -> BroadcastReport {
        self.metrics.message_received();

        let recipients: Vec<(ConnectionId, mpsc::Sender<Utf8Bytes>)> = {
            let peers = self.read_peers();
            peers
                .iter()
                .filter(|(id, _)| **id != sender)
                .map(|(id, peer)| (*id, peer.outbound.clone()))
                .collect()
        };

        let mut report = BroadcastReport::default();
        let mut backlogged = Vec::new();
        for (id, outbound) in recipients {
            match outbound.try_send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(message)) => backlogged.push((id, outbound, message)),
                Err(TrySendError::Closed(_)) => {
                    debug!(conn_id = %id, from = %sender, "Outbound queue closed, dropping stale peer");
                    self.evict(id, &mut report);
                }
            }
        }

        if !backlogged.is_empty() {
            let send_timeout = self.config.send_timeout;
            let waits = backlogged.into_iter().map(|(id, outbound, message)| async move {
                let sent = match send_timeout {
                    Some(limit) => {
                        matches!(tokio::time::timeout(limit, outbound.send(message)).await, Ok(Ok(())))
                    }
                    None => outbound.send(message).await.is_ok(),
                };
                (id, sent)
            });
            for (id, sent) in join_all(waits).await {
                if sent {
                    report.delivered += 1;
                } else {
                    warn!(conn_id = %id, from = %sender, "Outbound queue stayed full, dropping slow peer");
                    self.evict(id, &mut report);
                }
            }
        }

        self.metrics.frames_delivered(report.delivered as u64);
        report
    }

    fn evict(&self, id: ConnectionId, report: &mut BroadcastReport) {
        if self.remove(id) {
            self.metrics.peer_evicted();
            report.evicted += 1;
        }
    }

    /// Remove a connection from the live set and cancel its session.
    ///
    /// Returns false if it was already gone. Safe to call any number of times.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let (removed, active) = {
            let mut peers = self.write_peers();
            let removed = peers.remove(&id);
            (removed, peers.len())
        };

        match removed {
            Some(peer) => {
                peer.cancel.cancel();
                debug!(conn_id = %id, active, "Connection removed from relay");
                true
            }
            None => false,
        }
    }

    /// Number of live connections at some instant during the call.
    pub fn active_count(&self) -> usize {
        self.read_peers().len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Stop accepting and cancel every live session. Returns how many were live.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<(ConnectionId, Peer)> = {
            let mut peers = self.write_peers();
            self.shutting_down.store(true, Ordering::Release);
            peers.drain().collect()
        };

        for (_, peer) in &drained {
            peer.cancel.cancel();
        }
        info!(closed = drained.len(), "Relay shut down");
        drained.len()
    }
}

/// Receiving side of one live connection.
///
/// Owned by the connection's session task. Dropping it removes the
/// connection from the live set, whichever way the session ends.
pub struct ConnectionHandle {
    id: ConnectionId,
    relay: Arc<Relay>,
    inbox: mpsc::Receiver<Utf8Bytes>,
    cancel: CancellationToken,
    connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Fires when the relay evicts this connection or shuts down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Next frame broadcast to this connection by a peer.
    ///
    /// Returns None once the connection has been removed and its queue drained.
    pub async fn recv(&mut self) -> Option<Utf8Bytes> {
        self.inbox.recv().await
    }

    /// A frame that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Utf8Bytes> {
        self.inbox.try_recv().ok()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.relay.remove(self.id);
    }
}
