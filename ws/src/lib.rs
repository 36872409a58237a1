//! WebSocket fan-out hub for real-time job progress.
//!
//! This crate pushes scan and discovery progress, plus operator system
//! messages, from the backend to any number of connected WebSocket clients.
//!
//! # Architecture
//!
//! - **Single-owner registry**: One hub task owns the connection registry and
//!   its per-class index. Everything else talks to it through channels, so no
//!   lock is ever held while touching a socket.
//! - **Topics**: `scan`, `discovery` and `system`, each with a bounded publish
//!   buffer. Publishing is a non-blocking `try_send`; a full buffer drops the
//!   event and reports `Error::Backpressure` to the producer.
//! - **Per-connection queues**: Each connection has its own bounded outbound
//!   queue drained by its own writer task. A connection whose queue is full is
//!   evicted as a slow consumer; the others are never delayed by it.
//! - **Liveness**: The writer task pings every `ping_period`; a connection
//!   that has not answered with a pong within `pong_wait` is removed.
//! - **Transport agnostic**: The hub sees connections only as a
//!   [`FrameSink`] / [`FrameSource`] pair. The `web` crate adapts axum's
//!   WebSocket to these traits.
//!
//! # Message Flow
//!
//! 1. A client upgrades on one of the WebSocket routes.
//! 2. The handler registers the split socket with the interest of that route.
//! 3. The hub spawns the connection's inbound and outbound tasks.
//! 4. A producer calls `Manager::publish` (directly or through the
//!    `JobEventHandler` registered with an `events::EventPublisher`).
//! 5. The hub enqueues the encoded envelope, once serialized and shared by
//!    every recipient, into each subscriber's outbound queue.
//!
//! # Example: Broadcasting progress
//!
//! ```rust,ignore
//! use events::ScanUpdate;
//!
//! let mut update = ScanUpdate::new(scan_id, "running", 42.0);
//! update.message = Some("Scanning 10.0.0.0/24".to_string());
//! app_state.ws_manager.broadcast_scan_update(update)?;
//! ```
//!
//! # Modules
//!
//! - `config`: Timing and sizing parameters with validation
//! - `connection`: Connection identity, transport traits and the registry
//! - `manager`: Control surface used by the rest of the application
//! - `message`: Topics and the wire envelope
//! - `metrics`: Delivery, drop and eviction counters

pub mod config;
pub mod connection;
pub mod error;
mod hub;
pub mod job_event_handler;
pub mod manager;
pub mod message;
pub mod metrics;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use config::HubConfig;
pub use connection::{ConnectedCounts, ConnectionId, Frame, FrameSink, FrameSource, Interest};
pub use error::{Error, Result};
pub use job_event_handler::JobEventHandler;
pub use manager::Manager;
pub use message::{Envelope, Topic};
pub use metrics::{HubMetricsSnapshot, MessagesSent};
