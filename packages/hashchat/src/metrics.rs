//! Relay metrics for observability
//!
//! Counters are updated from the relay hot path, so everything here is a
//! relaxed atomic. Readers get a point-in-time snapshot with no cross-counter
//! consistency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct RelayMetrics {
    // Connection metrics
    /// Connections accepted since server start
    pub total_connections: AtomicU64,
    /// Upgrade attempts rejected before reaching the relay
    pub handshake_failures: AtomicU64,

    // Message metrics
    /// Text frames received from clients
    pub messages_received: AtomicU64,
    /// Frames enqueued for delivery to recipients
    pub frames_delivered: AtomicU64,
    /// Binary frames refused (connection closed with 1003)
    pub binary_rejected: AtomicU64,

    // Error metrics
    /// Recipients removed during a broadcast (queue full or closed)
    pub peers_evicted: AtomicU64,
    /// Sessions that ended on a read or write error
    pub transport_errors: AtomicU64,

    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            handshake_failures: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
            binary_rejected: AtomicU64::new(0),
            peers_evicted: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    // Connection tracking
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Message tracking
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_delivered(&self, n: u64) {
        self.frames_delivered.fetch_add(n, Ordering::Relaxed);
    }

    pub fn binary_rejected(&self) {
        self.binary_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Error tracking
    pub fn peer_evicted(&self) {
        self.peers_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Point-in-time counters. `active` is the live-set size, which only the
    /// relay knows; see `Relay::metrics_snapshot`.
    pub fn snapshot(&self, active: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            started_at: self.started_at.to_rfc3339(),
            connections: ConnectionMetrics {
                active: active as u64,
                total: self.total_connections.load(Ordering::Relaxed),
                handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                delivered: self.frames_delivered.load(Ordering::Relaxed),
                binary_rejected: self.binary_rejected.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                peers_evicted: self.peers_evicted.load(Ordering::Relaxed),
                transport: self.transport_errors.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub started_at: String,
    pub connections: ConnectionMetrics,
    pub messages: MessageMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
    pub handshake_failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub delivered: u64,
    pub binary_rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub peers_evicted: u64,
    pub transport: u64,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub registered_users: u64,
    pub active_connections: u64,
}
