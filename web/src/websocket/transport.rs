//! Adapts axum's WebSocket halves to the hub's frame traits.
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use ws::{Frame, FrameSink, FrameSource};

pub(crate) struct AxumSink(SplitSink<WebSocket, Message>);

pub(crate) struct AxumSource(SplitStream<WebSocket>);

pub(crate) fn split(socket: WebSocket) -> (AxumSink, AxumSource) {
    let (sink, stream) = socket.split();
    (AxumSink(sink), AxumSource(stream))
}

fn transport_error(err: axum::Error) -> ws::Error {
    ws::Error::Transport(err.to_string())
}

#[async_trait]
impl FrameSink for AxumSink {
    async fn send(&mut self, frame: Frame) -> ws::Result<()> {
        let message = match frame {
            Frame::Text(payload) => Message::Text(
                String::from_utf8(payload.to_vec())
                    .map_err(|e| ws::Error::Transport(e.to_string()))?,
            ),
            Frame::Binary(payload) => Message::Binary(payload.to_vec()),
            Frame::Ping(payload) => Message::Ping(payload.to_vec()),
            Frame::Pong(payload) => Message::Pong(payload.to_vec()),
            Frame::Close => Message::Close(None),
        };
        self.0.send(message).await.map_err(transport_error)
    }

    async fn close(&mut self) -> ws::Result<()> {
        // The peer may already be gone; the close frame is best effort.
        let _ = self.0.send(Message::Close(None)).await;
        self.0.close().await.map_err(transport_error)
    }
}

#[async_trait]
impl FrameSource for AxumSource {
    async fn recv(&mut self) -> Option<ws::Result<Frame>> {
        let frame = match self.0.next().await? {
            Ok(Message::Text(text)) => Frame::Text(Bytes::from(text)),
            Ok(Message::Binary(data)) => Frame::Binary(Bytes::from(data)),
            Ok(Message::Ping(data)) => Frame::Ping(Bytes::from(data)),
            Ok(Message::Pong(data)) => Frame::Pong(Bytes::from(data)),
            Ok(Message::Close(_)) => Frame::Close,
            Err(e) => return Some(Err(transport_error(e))),
        };
        Some(Ok(frame))
    }
}
