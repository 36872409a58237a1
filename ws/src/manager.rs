use crate::config::HubConfig;
use crate::connection::{
    ConnectedCounts, ConnectionId, DisconnectReason, FrameSink, FrameSource, Interest,
};
use crate::error::{Error, Result};
use crate::hub::{Command, Hub, TopicQueues};
use crate::message::{Envelope, Topic};
use crate::metrics::{HubMetrics, HubMetricsSnapshot};
use bytes::Bytes;
use events::{DiscoveryUpdate, ScanUpdate};
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};

/// Depth of the hub's command channel.
const COMMAND_BUFFER: usize = 1024;

/// Control surface of a running hub. Cheap to share behind an `Arc`.
pub struct Manager {
    commands: mpsc::Sender<Command>,
    scan: mpsc::Sender<Bytes>,
    discovery: mpsc::Sender<Bytes>,
    system: mpsc::Sender<Bytes>,
    counts: watch::Receiver<ConnectedCounts>,
    metrics: Arc<HubMetrics>,
    accepting: AtomicBool,
    config: HubConfig,
}

impl Manager {
    /// Validates `config` and spawns the hub loop on the current tokio runtime.
    pub fn start(config: HubConfig) -> Result<Self> {
        config.validate()?;

        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (scan, scan_rx) = mpsc::channel(config.topic_buffer_size);
        let (discovery, discovery_rx) = mpsc::channel(config.topic_buffer_size);
        let (system, system_rx) = mpsc::channel(config.topic_buffer_size);
        let (counts_tx, counts) = watch::channel(ConnectedCounts::default());
        let metrics = HubMetrics::new();

        let hub = Hub::new(
            config.clone(),
            command_rx,
            commands.downgrade(),
            TopicQueues {
                scan: scan_rx,
                discovery: discovery_rx,
                system: system_rx,
            },
            counts_tx,
            metrics.clone(),
        );
        tokio::spawn(hub.run());

        Ok(Self {
            commands,
            scan,
            discovery,
            system,
            counts,
            metrics,
            accepting: AtomicBool::new(true),
            config,
        })
    }

    /// Register a new connection and return its unique ID.
    ///
    /// On success the hub owns the transport: it starts the connection's
    /// inbound and outbound tasks and closes the transport when the
    /// connection leaves the registry. On failure the transport is dropped.
    pub async fn register<S, R>(&self, interest: Interest, sink: S, source: R) -> Result<ConnectionId>
    where
        S: FrameSink + 'static,
        R: FrameSource + 'static,
    {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let connection_id = ConnectionId::new();
        let (reply, response) = oneshot::channel();
        self.send(Command::Register {
            connection_id: connection_id.clone(),
            interest,
            sink: Box::new(sink),
            source: Box::new(source),
            reply,
        })
        .await?;
        response.await.map_err(|_| Error::HubClosed)??;

        Ok(connection_id)
    }

    /// Add the classes in `interest` to an already registered connection.
    pub async fn subscribe(&self, connection_id: &ConnectionId, interest: Interest) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Subscribe {
            connection_id: connection_id.clone(),
            interest,
            reply,
        })
        .await?;
        response.await.map_err(|_| Error::HubClosed)?
    }

    /// Unregister a connection by ID. Unknown or already removed ids are ignored.
    pub async fn unregister(&self, connection_id: &ConnectionId) {
        let command = Command::Unregister {
            connection_id: connection_id.clone(),
            reason: DisconnectReason::Requested,
        };
        if self.send(command).await.is_err() {
            trace!("Hub closed before unregistering {}", connection_id);
        }
    }

    /// Queue an envelope for fan-out to its topic's subscribers.
    ///
    /// Never blocks: the envelope is serialized once here and handed to the
    /// topic buffer with `try_send`. A full buffer drops the event.
    pub fn publish(&self, envelope: &Envelope) -> Result<()> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }
        let topic = envelope.topic();
        let payload = envelope.encode()?;

        match self.topic_sender(topic).try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.metrics.publish_dropped();
                warn!("{} broadcast buffer full, dropping message", topic);
                Err(Error::Backpressure { topic })
            }
            Err(TrySendError::Closed(_)) => Err(Error::HubClosed),
        }
    }

    pub fn broadcast_scan_update(&self, update: ScanUpdate) -> Result<()> {
        self.publish(&Envelope::scan_update(update))
    }

    pub fn broadcast_discovery_update(&self, update: DiscoveryUpdate) -> Result<()> {
        self.publish(&Envelope::discovery_update(update))
    }

    /// Broadcast `{"message": message}` under envelope type `kind` to every connection.
    pub fn broadcast_system_message(&self, kind: &str, message: &str) -> Result<()> {
        self.publish(&Envelope::system_message(kind, message))
    }

    /// Snapshot of the registry as of the hub's last completed mutation.
    pub fn connected_counts(&self) -> ConnectedCounts {
        *self.counts.borrow()
    }

    /// Delivery, drop and eviction counters since the hub started.
    pub fn metrics(&self) -> HubMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Stop accepting work, let connections flush their queues, and wait
    /// until they have closed or the shutdown grace period has elapsed.
    pub async fn shutdown(&self) {
        self.stop_accepting();
        let (reply, done) = oneshot::channel();
        if self.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Close every connection immediately and stop the hub. Safe to call
    /// more than once and after `shutdown`.
    pub async fn close(&self) {
        self.stop_accepting();
        let (reply, done) = oneshot::channel();
        if self.send(Command::Close { reply }).await.is_ok() {
            let _ = done.await;
        }
    }

    fn stop_accepting(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            info!("WebSocket hub no longer accepting connections or broadcasts");
        }
    }

    fn topic_sender(&self, topic: Topic) -> &mpsc::Sender<Bytes> {
        match topic {
            Topic::Scan => &self.scan,
            Topic::Discovery => &self.discovery,
            Topic::System => &self.system,
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::HubClosed)
    }
}
