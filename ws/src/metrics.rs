//! Hub-wide counters.
//!
//! Written by the hub loop and the publish path, read by anyone holding the
//! [`Manager`](crate::Manager). Counters only ever grow; `active_connections`
//! in the snapshot is derived from opened minus closed.
use crate::connection::DisconnectReason;
use crate::message::Topic;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Connections registered (lifetime)
    connections_opened: AtomicU64,

    /// Connections removed from the registry for any reason
    connections_closed: AtomicU64,

    /// Messages enqueued to a subscriber, per topic
    scan_messages_sent: AtomicU64,
    discovery_messages_sent: AtomicU64,
    system_messages_sent: AtomicU64,

    /// Publishes refused because the topic buffer was full
    publishes_dropped: AtomicU64,

    slow_consumer_evictions: AtomicU64,
    expired_evictions: AtomicU64,
}

impl HubMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection leaving the registry, counting evictions by cause.
    pub fn connection_closed(&self, reason: &DisconnectReason) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
        match reason {
            DisconnectReason::SlowConsumer => {
                self.slow_consumer_evictions.fetch_add(1, Ordering::Relaxed);
            }
            DisconnectReason::Expired => {
                self.expired_evictions.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn messages_sent(&self, topic: Topic, count: usize) {
        let counter = match topic {
            Topic::Scan => &self.scan_messages_sent,
            Topic::Discovery => &self.discovery_messages_sent,
            Topic::System => &self.system_messages_sent,
        };
        counter.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn publish_dropped(&self) {
        self.publishes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HubMetricsSnapshot {
        let opened = self.connections_opened.load(Ordering::Relaxed);
        let closed = self.connections_closed.load(Ordering::Relaxed);
        HubMetricsSnapshot {
            connections_opened: opened,
            connections_closed: closed,
            active_connections: opened.saturating_sub(closed),
            messages_sent: MessagesSent {
                scan: self.scan_messages_sent.load(Ordering::Relaxed),
                discovery: self.discovery_messages_sent.load(Ordering::Relaxed),
                system: self.system_messages_sent.load(Ordering::Relaxed),
            },
            publishes_dropped: self.publishes_dropped.load(Ordering::Relaxed),
            slow_consumer_evictions: self.slow_consumer_evictions.load(Ordering::Relaxed),
            expired_evictions: self.expired_evictions.load(Ordering::Relaxed),
        }
    }
}

/// Messages enqueued to subscribers, per topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MessagesSent {
    pub scan: u64,
    pub discovery: u64,
    pub system: u64,
}

/// Point-in-time copy of [`HubMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubMetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub active_connections: u64,
    pub messages_sent: MessagesSent,
    pub publishes_dropped: u64,
    pub slow_consumer_evictions: u64,
    pub expired_evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn evictions_are_counted_by_cause() {
        let metrics = HubMetrics::new();
        for _ in 0..4 {
            metrics.connection_opened();
        }

        metrics.connection_closed(&DisconnectReason::SlowConsumer);
        metrics.connection_closed(&DisconnectReason::Expired);
        metrics.connection_closed(&DisconnectReason::Failed(Error::WriteTimeout));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_opened, 4);
        assert_eq!(snapshot.connections_closed, 3);
        assert_eq!(snapshot.active_connections, 1);
        assert_eq!(snapshot.slow_consumer_evictions, 1);
        assert_eq!(snapshot.expired_evictions, 1);
    }

    #[test]
    fn messages_are_counted_per_topic() {
        let metrics = HubMetrics::new();

        metrics.messages_sent(Topic::Scan, 5);
        metrics.messages_sent(Topic::Scan, 2);
        metrics.messages_sent(Topic::System, 3);
        metrics.publish_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(
            snapshot.messages_sent,
            MessagesSent {
                scan: 7,
                discovery: 0,
                system: 3
            }
        );
        assert_eq!(snapshot.publishes_dropped, 1);
    }
}
