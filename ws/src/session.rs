//! Per-connection tasks.
//!
//! Every registered connection runs two tasks sharing nothing but channels:
//!
//! - **Inbound**: reads control frames from the peer, refreshes the liveness
//!   deadline on every pong and reports failures to the hub.
//! - **Outbound**: the only writer on the transport. Drains the connection's
//!   outbound queue in FIFO order and interleaves keepalive pings, each write
//!   bounded by the per-write deadline.
//!
//! Either task reports its own failure to the hub as an unregister; the hub
//! then signals the sibling task to stop. Neither task touches the registry.
use crate::config::HubConfig;
use crate::connection::{BoxedSink, BoxedSource, ConnectionId, DisconnectReason, Frame};
use crate::error::Error;
use crate::hub::Command;
use bytes::Bytes;
use log::*;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};

/// Outcome of a task loop: `None` when the hub asked the task to stop.
type Exit = Option<DisconnectReason>;

pub(crate) async fn run_outbound(
    connection_id: ConnectionId,
    mut sink: BoxedSink,
    mut queue: mpsc::Receiver<Bytes>,
    mut stop: watch::Receiver<bool>,
    config: HubConfig,
    hub: mpsc::Sender<Command>,
) {
    let mut keepalive = interval_at(Instant::now() + config.ping_period, config.ping_period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit: Exit = loop {
        tokio::select! {
            biased;

            _ = stopped(&mut stop) => break None,

            message = queue.recv() => match message {
                Some(payload) => {
                    if let Err(e) = write(&mut sink, Frame::Text(payload), &config).await {
                        break Some(DisconnectReason::Failed(e));
                    }
                }
                // Queue released by the hub and fully flushed.
                None => break Some(DisconnectReason::Drained),
            },

            _ = keepalive.tick() => {
                trace!("Sending ping to connection {}", connection_id);
                if let Err(e) = write(&mut sink, Frame::Ping(Bytes::new()), &config).await {
                    break Some(DisconnectReason::Failed(e));
                }
            }
        }
    };

    if let Some(reason) = exit {
        debug!("Outbound task for connection {} ending: {}", connection_id, reason);
        report(&hub, connection_id.clone(), reason).await;
    }

    match timeout(config.write_wait, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Error closing connection {}: {}", connection_id, e),
        Err(_) => debug!("Timed out closing connection {}", connection_id),
    }
    trace!("Outbound task for connection {} exited", connection_id);
}

pub(crate) async fn run_inbound(
    connection_id: ConnectionId,
    mut source: BoxedSource,
    mut stop: watch::Receiver<bool>,
    config: HubConfig,
    hub: mpsc::Sender<Command>,
) {
    let mut deadline = Instant::now() + config.pong_wait;

    let exit: Exit = loop {
        tokio::select! {
            biased;

            _ = stopped(&mut stop) => break None,

            next = timeout_at(deadline, source.recv()) => match next {
                Err(_) => break Some(DisconnectReason::Expired),
                Ok(None) | Ok(Some(Ok(Frame::Close))) => break Some(DisconnectReason::PeerClosed),
                Ok(Some(Err(e))) => break Some(DisconnectReason::Failed(e)),
                Ok(Some(Ok(Frame::Pong(_)))) => {
                    deadline = Instant::now() + config.pong_wait;
                    let heartbeat = Command::Heartbeat {
                        connection_id: connection_id.clone(),
                        deadline,
                    };
                    if hub.send(heartbeat).await.is_err() {
                        break None;
                    }
                }
                Ok(Some(Ok(Frame::Text(payload) | Frame::Binary(payload)))) => {
                    if payload.len() > config.max_message_size {
                        break Some(DisconnectReason::Failed(Error::FrameTooLarge {
                            size: payload.len(),
                            max: config.max_message_size,
                        }));
                    }
                    // Clients are receive-only; application payloads are ignored.
                    trace!("Ignoring {} byte message from connection {}", payload.len(), connection_id);
                }
                // The transport answers pings itself.
                Ok(Some(Ok(Frame::Ping(_)))) => {}
            },
        }
    };

    if let Some(reason) = exit {
        match reason {
            DisconnectReason::PeerClosed => {
                debug!("Connection {} closed by peer", connection_id)
            }
            ref other => warn!("Inbound task for connection {} ending: {}", connection_id, other),
        }
        report(&hub, connection_id.clone(), reason).await;
    }
    trace!("Inbound task for connection {} exited", connection_id);
}

/// Writes one frame under the per-write deadline. The elapsed deadline is the
/// timeout signal; there is no second racing timer.
async fn write(sink: &mut BoxedSink, frame: Frame, config: &HubConfig) -> Result<(), Error> {
    match timeout(config.write_wait, sink.send(frame)).await {
        Ok(result) => result,
        Err(_) => Err(Error::WriteTimeout),
    }
}

/// Resolves once the hub signals stop, or once the hub side is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

async fn report(hub: &mpsc::Sender<Command>, connection_id: ConnectionId, reason: DisconnectReason) {
    // The hub may already be gone during shutdown; nothing left to notify.
    let _ = hub
        .send(Command::Unregister {
            connection_id,
            reason,
        })
        .await;
}
