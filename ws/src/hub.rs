//! The hub: single owner of the connection registry.
//!
//! All registry mutations happen inside [`Hub::run`], which reacts to one
//! event at a time: commands from the control surface and from connection
//! tasks, payloads arriving on the topic buffers, the liveness sweep timer and
//! finished connection tasks. The hub never writes to a transport; fan-out is
//! a non-blocking enqueue into each subscriber's outbound queue.
use crate::config::HubConfig;
use crate::connection::{
    BoxedSink, BoxedSource, ConnectedCounts, ConnectionId, ConnectionInfo, ConnectionRegistry,
    DisconnectReason, Interest,
};
use crate::error::{Error, Result};
use crate::message::Topic;
use crate::metrics::HubMetrics;
use crate::session;
use bytes::Bytes;
use log::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};

/// How long stopped connection tasks get to send their close frames on a
/// forced close before they are aborted.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) enum Command {
    Register {
        connection_id: ConnectionId,
        interest: Interest,
        sink: BoxedSink,
        source: BoxedSource,
        reply: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        connection_id: ConnectionId,
        interest: Interest,
        reply: oneshot::Sender<Result<()>>,
    },
    Unregister {
        connection_id: ConnectionId,
        reason: DisconnectReason,
    },
    Heartbeat {
        connection_id: ConnectionId,
        deadline: Instant,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Consumer ends of the per-topic publish buffers.
pub(crate) struct TopicQueues {
    pub scan: mpsc::Receiver<Bytes>,
    pub discovery: mpsc::Receiver<Bytes>,
    pub system: mpsc::Receiver<Bytes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    /// Cooperative shutdown: queues released, waiting for tasks to finish.
    Draining { until: Instant },
    Closing,
}

pub(crate) struct Hub {
    config: HubConfig,
    registry: ConnectionRegistry,
    commands: mpsc::Receiver<Command>,
    /// Handed to connection tasks; weak so the hub does not keep its own
    /// command channel open.
    handle: mpsc::WeakSender<Command>,
    topics: TopicQueues,
    tasks: JoinSet<()>,
    /// Connection each running task belongs to.
    task_owners: HashMap<task::Id, ConnectionId>,
    counts: watch::Sender<ConnectedCounts>,
    metrics: Arc<HubMetrics>,
    phase: Phase,
    waiters: Vec<oneshot::Sender<()>>,
}

impl Hub {
    pub fn new(
        config: HubConfig,
        commands: mpsc::Receiver<Command>,
        handle: mpsc::WeakSender<Command>,
        topics: TopicQueues,
        counts: watch::Sender<ConnectedCounts>,
        metrics: Arc<HubMetrics>,
    ) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::new(),
            commands,
            handle,
            topics,
            tasks: JoinSet::new(),
            task_owners: HashMap::new(),
            counts,
            metrics,
            phase: Phase::Running,
            waiters: Vec::new(),
        }
    }

    pub async fn run(mut self) {
        info!(
            "WebSocket hub started (pong_wait={:?}, ping_period={:?}, buffer_size={})",
            self.config.pong_wait, self.config.ping_period, self.config.buffer_size
        );

        let mut sweep = interval_at(
            Instant::now() + self.config.sweep_interval,
            self.config.sweep_interval,
        );
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let drain_until = match self.phase {
                Phase::Running => None,
                Phase::Draining { until } => Some(until),
                Phase::Closing => break,
            };
            let running = drain_until.is_none();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        debug!("All hub handles dropped, closing");
                        self.phase = Phase::Closing;
                    }
                },

                Some(payload) = self.topics.scan.recv(), if running => {
                    self.fan_out(Topic::Scan, payload)
                }

                Some(payload) = self.topics.discovery.recv(), if running => {
                    self.fan_out(Topic::Discovery, payload)
                }

                Some(payload) = self.topics.system.recv(), if running => {
                    self.fan_out(Topic::System, payload)
                }

                _ = sweep.tick() => self.sweep(),

                Some(joined) = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
                    self.reap(joined)
                }

                _ = sleep_until(drain_until.unwrap_or_else(Instant::now)), if !running => {
                    warn!(
                        "Shutdown grace period elapsed with {} connection(s) still open",
                        self.registry.len()
                    );
                    self.phase = Phase::Closing;
                }
            }

            if matches!(self.phase, Phase::Draining { .. }) && self.tasks.is_empty() {
                self.phase = Phase::Closing;
            }
        }

        self.close_all().await;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
        info!("WebSocket hub stopped");
    }

    fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                connection_id,
                interest,
                sink,
                source,
                reply,
            } => {
                let result = self.register(connection_id, interest, sink, source);
                let _ = reply.send(result);
            }
            Command::Subscribe {
                connection_id,
                interest,
                reply,
            } => {
                let result = self.subscribe(&connection_id, interest);
                let _ = reply.send(result);
            }
            Command::Unregister {
                connection_id,
                reason,
            } => self.unregister(&connection_id, reason),
            Command::Heartbeat {
                connection_id,
                deadline,
            } => {
                if !self.registry.refresh_deadline(&connection_id, deadline) {
                    trace!("Heartbeat from unregistered connection {}", connection_id);
                }
            }
            Command::Shutdown { reply } => {
                self.waiters.push(reply);
                self.begin_drain();
            }
            Command::Close { reply } => {
                self.waiters.push(reply);
                self.phase = Phase::Closing;
            }
        }
    }

    /// Adds the connection to the registry and starts its task pair. The
    /// transport is dropped, and so closed, if the hub refuses it.
    fn register(
        &mut self,
        connection_id: ConnectionId,
        interest: Interest,
        sink: BoxedSink,
        source: BoxedSource,
    ) -> Result<()> {
        if !self.is_running() {
            return Err(Error::ShuttingDown);
        }

        if self.registry.contains(&connection_id) {
            return self.subscribe(&connection_id, interest);
        }

        let hub = self.handle.upgrade().ok_or(Error::HubClosed)?;
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.buffer_size);
        let (stop_tx, stop_rx) = watch::channel(false);
        let deadline = Instant::now() + self.config.pong_wait;

        let outbound = self.tasks.spawn(session::run_outbound(
            connection_id.clone(),
            sink,
            outbound_rx,
            stop_rx.clone(),
            self.config.clone(),
            hub.clone(),
        ));
        let inbound = self.tasks.spawn(session::run_inbound(
            connection_id.clone(),
            source,
            stop_rx,
            self.config.clone(),
            hub,
        ));
        self.task_owners.insert(outbound.id(), connection_id.clone());
        self.task_owners.insert(inbound.id(), connection_id.clone());

        self.registry.insert(
            connection_id.clone(),
            ConnectionInfo::new(outbound_tx, stop_tx, deadline),
        );
        self.registry.subscribe(&connection_id, interest);
        self.metrics.connection_opened();

        let counts = self.publish_counts();
        debug!(
            "Client {} registered for {} updates (total_clients={})",
            connection_id, interest, counts.total
        );
        Ok(())
    }

    fn subscribe(&mut self, connection_id: &ConnectionId, interest: Interest) -> Result<()> {
        if !self.is_running() {
            return Err(Error::ShuttingDown);
        }
        if !self.registry.contains(connection_id) {
            return Err(Error::NotRegistered);
        }

        let added = self.registry.subscribe(connection_id, interest);
        if !added.is_empty() {
            self.publish_counts();
            debug!("Client {} subscribed to {:?}", connection_id, added);
        }
        Ok(())
    }

    /// Idempotent: only the first unregister of a connection has any effect.
    fn unregister(&mut self, connection_id: &ConnectionId, reason: DisconnectReason) {
        if self.registry.remove(connection_id).is_none() {
            trace!(
                "Connection {} already unregistered ({})",
                connection_id,
                reason
            );
            return;
        }

        self.metrics.connection_closed(&reason);
        let counts = self.publish_counts();
        match reason {
            DisconnectReason::SlowConsumer | DisconnectReason::Expired => warn!(
                "Evicted client {}: {} (total_clients={})",
                connection_id, reason, counts.total
            ),
            _ => debug!(
                "Client {} unregistered: {} (total_clients={})",
                connection_id, reason, counts.total
            ),
        }
    }

    fn fan_out(&mut self, topic: Topic, payload: Bytes) {
        let fan_out = self.registry.enqueue(topic, &payload);
        self.metrics.messages_sent(topic, fan_out.delivered);
        trace!(
            "Broadcast {} message to {} client(s), {} failed",
            topic,
            fan_out.delivered,
            fan_out.failed.len()
        );

        // Removal happens after the iteration so the index is never mutated mid-walk.
        for (connection_id, reason) in fan_out.failed {
            self.unregister(&connection_id, reason);
        }
    }

    fn sweep(&mut self) {
        for connection_id in self.registry.expired(Instant::now()) {
            self.unregister(&connection_id, DisconnectReason::Expired);
        }
    }

    fn begin_drain(&mut self) {
        if !self.is_running() {
            return;
        }
        info!(
            "WebSocket hub shutting down, draining {} connection(s)",
            self.registry.len()
        );
        self.registry.release_queues();
        self.phase = Phase::Draining {
            until: Instant::now() + self.config.shutdown_grace,
        };
    }

    /// A task that failed instead of returning never reported its own exit,
    /// so its connection is unregistered here.
    fn reap(&mut self, joined: std::result::Result<(task::Id, ()), JoinError>) {
        let (task_id, failure) = match joined {
            Ok((task_id, ())) => (task_id, None),
            Err(e) => (e.id(), Some(e)),
        };
        let Some(connection_id) = self.task_owners.remove(&task_id) else {
            return;
        };

        if let Some(e) = failure {
            if e.is_panic() {
                error!("Task for connection {} panicked", connection_id);
            }
            self.unregister(
                &connection_id,
                DisconnectReason::Failed(Error::TaskFailed(e.to_string())),
            );
        }
    }

    /// Closes every remaining connection and waits for all tasks to exit.
    async fn close_all(&mut self) {
        let closed = self.registry.clear();
        if !closed.is_empty() {
            info!("Closing {} WebSocket connection(s)", closed.len());
            for _ in &closed {
                self.metrics.connection_closed(&DisconnectReason::Requested);
            }
        }

        let drained = timeout(CLOSE_TIMEOUT, async {
            while let Some(joined) = self.tasks.join_next_with_id().await {
                self.reap(joined);
            }
        })
        .await;
        if drained.is_err() {
            debug!("Aborting {} connection task(s) still running", self.tasks.len());
        }
        self.tasks.shutdown().await;
        self.task_owners.clear();
        self.publish_counts();
    }

    fn publish_counts(&self) -> ConnectedCounts {
        let counts = self.registry.counts();
        self.counts.send_replace(counts);
        counts
    }
}
