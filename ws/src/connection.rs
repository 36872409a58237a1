use crate::error::{Error, Result};
use crate::message::Topic;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subscriber class a connection can be indexed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    Scan,
    Discovery,
}

/// Interest set requested at connect time, one per WebSocket entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Scan,
    Discovery,
    /// Both scan and discovery.
    General,
}

impl Interest {
    pub fn classes(self) -> &'static [Class] {
        match self {
            Interest::Scan => &[Class::Scan],
            Interest::Discovery => &[Class::Discovery],
            Interest::General => &[Class::Scan, Class::Discovery],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Interest::Scan => "scan",
            Interest::Discovery => "discovery",
            Interest::General => "general",
        }
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection left the registry.
#[derive(Debug)]
pub enum DisconnectReason {
    /// Explicit unregister through the control surface.
    Requested,
    /// The peer sent a close frame or the stream ended.
    PeerClosed,
    /// Outbound queue overflowed.
    SlowConsumer,
    /// Liveness deadline passed without a pong.
    Expired,
    /// Outbound queue flushed after the hub released it.
    Drained,
    /// Read or write failure on the transport.
    Failed(Error),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Requested => write!(f, "unregistered"),
            DisconnectReason::PeerClosed => write!(f, "closed by peer"),
            DisconnectReason::SlowConsumer => write!(f, "slow consumer, outbound queue full"),
            DisconnectReason::Expired => write!(f, "liveness deadline expired"),
            DisconnectReason::Drained => write!(f, "drained"),
            DisconnectReason::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// A single message on a framed, full-duplex transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(Bytes),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close,
}

/// Write half of a transport connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Sends a close frame and releases the transport.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a transport connection. `None` means the stream has ended.
#[async_trait]
pub trait FrameSource: Send {
    async fn recv(&mut self) -> Option<Result<Frame>>;
}

pub type BoxedSink = Box<dyn FrameSink>;
pub type BoxedSource = Box<dyn FrameSource>;

/// Number of registered connections per class and in total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectedCounts {
    pub scan: usize,
    pub discovery: usize,
    /// Distinct connections; a general subscriber counts once.
    pub total: usize,
}

/// Hub-side handle of one registered connection.
#[derive(Debug)]
pub(crate) struct ConnectionInfo {
    pub classes: HashSet<Class>,
    /// Producer side of the outbound queue; `None` once draining.
    pub outbound: Option<mpsc::Sender<Bytes>>,
    pub stop: watch::Sender<bool>,
    pub deadline: Instant,
}

impl ConnectionInfo {
    pub fn new(outbound: mpsc::Sender<Bytes>, stop: watch::Sender<bool>, deadline: Instant) -> Self {
        Self {
            classes: HashSet::new(),
            outbound: Some(outbound),
            stop,
            deadline,
        }
    }

    /// Releases the outbound queue and signals both of the connection's tasks to stop.
    fn close(&mut self) {
        self.outbound = None;
        let _ = self.stop.send(true);
    }
}

/// Outcome of fanning one payload out to a subscriber set.
#[derive(Debug, Default)]
pub(crate) struct FanOut {
    pub delivered: usize,
    pub failed: Vec<(ConnectionId, DisconnectReason)>,
}

/// Connection registry with a per-class index. Owned and mutated by the hub loop only.
#[derive(Debug, Default)]
pub(crate) struct ConnectionRegistry {
    /// Primary storage: lookup by connection_id
    connections: HashMap<ConnectionId, ConnectionInfo>,

    /// Secondary index: class -> connections subscribed to it
    class_index: HashMap<Class, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, connection_id: ConnectionId, info: ConnectionInfo) {
        self.connections.insert(connection_id, info);
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Indexes the connection under every class in `interest` it is not
    /// already indexed under. Returns the classes that were newly added.
    pub fn subscribe(&mut self, connection_id: &ConnectionId, interest: Interest) -> Vec<Class> {
        let Some(info) = self.connections.get_mut(connection_id) else {
            return Vec::new();
        };

        let mut added = Vec::new();
        for class in interest.classes() {
            if info.classes.insert(*class) {
                self.class_index
                    .entry(*class)
                    .or_default()
                    .insert(connection_id.clone());
                added.push(*class);
            }
        }
        added
    }

    /// Removes the connection from storage and every index, closing it.
    /// Returns `None` if it was not registered.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<ConnectionInfo> {
        let mut info = self.connections.remove(connection_id)?;

        for class in &info.classes {
            if let Some(members) = self.class_index.get_mut(class) {
                members.remove(connection_id);
                if members.is_empty() {
                    self.class_index.remove(class);
                }
            }
        }

        info.close();
        Some(info)
    }

    pub fn refresh_deadline(&mut self, connection_id: &ConnectionId, deadline: Instant) -> bool {
        match self.connections.get_mut(connection_id) {
            Some(info) => {
                info.deadline = info.deadline.max(deadline);
                true
            }
            None => false,
        }
    }

    /// Connections whose liveness deadline is at or before `now`.
    pub fn expired(&self, now: Instant) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, info)| info.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Attempts a non-blocking enqueue of `payload` into the outbound queue of
    /// every connection subscribed to `topic`. Connections that cannot take it
    /// are reported back rather than removed, so the caller can unregister them
    /// after the iteration completes.
    pub fn enqueue(&self, topic: Topic, payload: &Bytes) -> FanOut {
        let mut fan_out = FanOut::default();

        let targets: Vec<&ConnectionId> = match topic.class() {
            Some(class) => self
                .class_index
                .get(&class)
                .map(|members| members.iter().collect())
                .unwrap_or_default(),
            None => self.connections.keys().collect(),
        };

        for connection_id in targets {
            let Some(sender) = self
                .connections
                .get(connection_id)
                .and_then(|info| info.outbound.as_ref())
            else {
                fan_out.failed.push((
                    connection_id.clone(),
                    DisconnectReason::Failed(Error::Transport(
                        "connection indexed without an outbound queue".to_string(),
                    )),
                ));
                continue;
            };

            match sender.try_send(payload.clone()) {
                Ok(()) => fan_out.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => fan_out
                    .failed
                    .push((connection_id.clone(), DisconnectReason::SlowConsumer)),
                Err(mpsc::error::TrySendError::Closed(_)) => fan_out.failed.push((
                    connection_id.clone(),
                    DisconnectReason::Failed(Error::Transport(
                        "outbound task exited".to_string(),
                    )),
                )),
            }
        }

        fan_out
    }

    /// Releases every outbound queue so the outbound tasks can flush what is
    /// already queued and then close. Connections stay registered.
    pub fn release_queues(&mut self) {
        for info in self.connections.values_mut() {
            info.outbound = None;
        }
    }

    /// Removes every connection, returning their ids.
    pub fn clear(&mut self) -> Vec<ConnectionId> {
        let ids: Vec<ConnectionId> = self.connections.keys().cloned().collect();
        for id in &ids {
            self.remove(id);
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn counts(&self) -> ConnectedCounts {
        let members = |class| self.class_index.get(&class).map_or(0, HashSet::len);
        ConnectedCounts {
            scan: members(Class::Scan),
            discovery: members(Class::Discovery),
            total: self.connections.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn register(
        registry: &mut ConnectionRegistry,
        interest: Interest,
        depth: usize,
    ) -> (ConnectionId, mpsc::Receiver<Bytes>, watch::Receiver<bool>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(depth);
        let (stop_tx, stop_rx) = watch::channel(false);
        registry.insert(
            id.clone(),
            ConnectionInfo::new(tx, stop_tx, Instant::now() + Duration::from_secs(60)),
        );
        registry.subscribe(&id, interest);
        (id, rx, stop_rx)
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn general_interest_covers_both_classes() {
        assert_eq!(Interest::General.classes(), &[Class::Scan, Class::Discovery]);
        assert_eq!(Interest::Scan.classes(), &[Class::Scan]);
    }

    #[tokio::test]
    async fn counts_reflect_class_index_and_distinct_total() {
        let mut registry = ConnectionRegistry::new();
        let mut held = Vec::new();
        for _ in 0..3 {
            held.push(register(&mut registry, Interest::Discovery, 4));
        }
        for _ in 0..2 {
            held.push(register(&mut registry, Interest::General, 4));
        }

        assert_eq!(
            registry.counts(),
            ConnectedCounts {
                scan: 2,
                discovery: 5,
                total: 5
            }
        );
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_per_class() {
        let mut registry = ConnectionRegistry::new();
        let (id, _rx, _stop) = register(&mut registry, Interest::Scan, 4);

        assert!(registry.subscribe(&id, Interest::Scan).is_empty());
        assert_eq!(registry.subscribe(&id, Interest::General), vec![Class::Discovery]);
        assert_eq!(registry.counts().scan, 1);
        assert_eq!(registry.counts().discovery, 1);
        assert_eq!(registry.counts().total, 1);
    }

    #[tokio::test]
    async fn remove_clears_every_index_and_signals_stop() {
        let mut registry = ConnectionRegistry::new();
        let (id, _rx, stop) = register(&mut registry, Interest::General, 4);

        let info = registry.remove(&id).expect("registered");
        assert!(info.outbound.is_none());
        assert!(*stop.borrow());
        assert_eq!(registry.counts(), ConnectedCounts::default());

        assert!(registry.remove(&id).is_none());
    }

    #[tokio::test]
    async fn enqueue_reports_full_queue_as_slow_consumer() {
        let mut registry = ConnectionRegistry::new();
        let (slow, _slow_rx, _s1) = register(&mut registry, Interest::Scan, 1);
        let (_fast, mut fast_rx, _s2) = register(&mut registry, Interest::Scan, 8);
        let payload = Bytes::from_static(b"{}");

        let first = registry.enqueue(Topic::Scan, &payload);
        assert_eq!(first.delivered, 2);
        assert!(first.failed.is_empty());

        let second = registry.enqueue(Topic::Scan, &payload);
        assert_eq!(second.delivered, 1);
        assert_eq!(second.failed.len(), 1);
        assert_eq!(second.failed[0].0, slow);
        assert!(matches!(second.failed[0].1, DisconnectReason::SlowConsumer));

        assert_eq!(fast_rx.recv().await, Some(payload.clone()));
        assert_eq!(fast_rx.recv().await, Some(payload));
    }

    #[tokio::test]
    async fn system_topic_reaches_every_connection_once() {
        let mut registry = ConnectionRegistry::new();
        let (_a, mut a_rx, _s1) = register(&mut registry, Interest::General, 4);
        let (_b, mut b_rx, _s2) = register(&mut registry, Interest::Discovery, 4);

        let fan_out = registry.enqueue(Topic::System, &Bytes::from_static(b"x"));

        assert_eq!(fan_out.delivered, 2);
        assert!(a_rx.try_recv().is_ok());
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn expired_returns_connections_past_their_deadline() {
        let mut registry = ConnectionRegistry::new();
        let (id, _rx, _stop) = register(&mut registry, Interest::Scan, 4);
        let now = Instant::now();

        assert!(registry.expired(now).is_empty());
        assert_eq!(registry.expired(now + Duration::from_secs(61)), vec![id.clone()]);

        registry.refresh_deadline(&id, now + Duration::from_secs(120));
        assert!(registry.expired(now + Duration::from_secs(61)).is_empty());
    }
}
