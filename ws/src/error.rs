//! Error type for the WebSocket hub.
use crate::message::Topic;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The topic's publish buffer is full; the event was dropped.
    Backpressure { topic: Topic },

    /// The hub stopped accepting registrations and publishes.
    ShuttingDown,

    /// The hub loop has exited.
    HubClosed,

    /// The connection id is not in the registry.
    NotRegistered,

    /// Timing or sizing parameters that the hub cannot run with.
    InvalidConfig(String),

    /// An envelope could not be encoded to JSON.
    Serialization(serde_json::Error),

    /// Read or write failure reported by the transport.
    Transport(String),

    /// A frame write did not complete within the per-write deadline.
    WriteTimeout,

    /// The peer sent a frame larger than the configured maximum.
    FrameTooLarge { size: usize, max: usize },

    /// A connection task panicked or was cancelled.
    TaskFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Backpressure { topic } => {
                write!(f, "{topic} broadcast buffer full, message dropped")
            }
            Error::ShuttingDown => write!(f, "WebSocket hub is shutting down"),
            Error::HubClosed => write!(f, "WebSocket hub is closed"),
            Error::NotRegistered => write!(f, "Connection is not registered"),
            Error::InvalidConfig(msg) => write!(f, "Invalid hub configuration: {msg}"),
            Error::Serialization(e) => write!(f, "Failed to serialize envelope: {e}"),
            Error::Transport(msg) => write!(f, "Transport error: {msg}"),
            Error::WriteTimeout => write!(f, "Write deadline exceeded"),
            Error::FrameTooLarge { size, max } => {
                write!(f, "Inbound frame of {size} bytes exceeds limit of {max}")
            }
            Error::TaskFailed(msg) => write!(f, "Connection task failed: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err)
    }
}
