//! In-memory transports for exercising the hub without sockets.
use crate::connection::{Frame, FrameSink, FrameSource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sink that forwards every written frame to the paired [`Peer`].
pub struct ChannelSink {
    frames: mpsc::UnboundedSender<Frame>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.frames
            .send(frame)
            .map_err(|_| Error::Transport("peer went away".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.send(Frame::Close).await
    }
}

/// Source fed by the paired [`Peer`]. Ends when the peer drops its sender.
pub struct ChannelSource {
    frames: mpsc::UnboundedReceiver<Result<Frame>>,
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        self.frames.recv().await
    }
}

/// Sink whose writes never complete, standing in for a peer that stopped reading.
pub struct StalledSink;

#[async_trait]
impl FrameSink for StalledSink {
    async fn send(&mut self, _frame: Frame) -> Result<()> {
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Source that panics on its first read.
pub struct PanickingSource;

#[async_trait]
impl FrameSource for PanickingSource {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        panic!("transport read failed")
    }
}

/// The remote end of an in-memory connection.
pub struct Peer {
    /// Frames the hub wrote to this peer.
    pub received: mpsc::UnboundedReceiver<Frame>,
    /// Frames this peer sends to the hub. Dropping it ends the stream.
    pub outgoing: Option<mpsc::UnboundedSender<Result<Frame>>>,
}

pub fn pair() -> (ChannelSink, ChannelSource, Peer) {
    let (sink_tx, sink_rx) = mpsc::unbounded_channel();
    let (source_tx, source_rx) = mpsc::unbounded_channel();
    (
        ChannelSink { frames: sink_tx },
        ChannelSource { frames: source_rx },
        Peer {
            received: sink_rx,
            outgoing: Some(source_tx),
        },
    )
}

impl Peer {
    /// Next frame that is not a ping, waiting at most five seconds.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match tokio::time::timeout(Duration::from_secs(5), self.received.recv()).await {
                Ok(Some(Frame::Ping(_))) => continue,
                Ok(frame) => return frame,
                Err(_) => return None,
            }
        }
    }

    /// Next text message, decoded as JSON.
    pub async fn next_json(&mut self) -> Value {
        match self.next_frame().await {
            Some(Frame::Text(payload)) => serde_json::from_slice(&payload).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    pub fn send(&self, frame: Frame) {
        if let Some(outgoing) = &self.outgoing {
            let _ = outgoing.send(Ok(frame));
        }
    }

    /// Ends the inbound stream as a peer hanging up would.
    pub fn hang_up(&mut self) {
        self.outgoing = None;
    }

    /// Answers every ping with a pong until the hub closes the connection.
    pub fn respond_to_pings(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(frame) = self.received.recv().await {
                match frame {
                    Frame::Ping(payload) => self.send(Frame::Pong(payload)),
                    Frame::Close => break,
                    _ => {}
                }
            }
        })
    }
}

pub fn text(payload: &'static str) -> Frame {
    Frame::Text(Bytes::from_static(payload.as_bytes()))
}
