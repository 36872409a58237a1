use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The WebSocket hub refused or failed the operation.
    Hub(ws::Error),
    /// An event handler rejected a published event.
    Event(events::Error),
    /// The request parsed but its content is unusable.
    InvalidParams(String),
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Hub(e) => Some(e),
            Error::Event(e) => Some(e),
            Error::InvalidParams(_) => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match self {
            Error::Hub(e) => write!(fmt, "{e}"),
            Error::Event(e) => write!(fmt, "{e}"),
            Error::InvalidParams(msg) => write!(fmt, "Invalid parameters: {msg}"),
        }
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html#associatedconstant.UNPROCESSABLE_ENTITY
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Hub(
                ws::Error::Backpressure { .. } | ws::Error::ShuttingDown | ws::Error::HubClosed,
            )
            | Error::Event(events::Error::Rejected { .. }) => {
                warn!("Service unavailable: {self}");
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE UNAVAILABLE").into_response()
            }
            Error::InvalidParams(msg) => {
                debug!("Rejecting request: {msg}");
                (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE ENTITY").into_response()
            }
            Error::Hub(e) => {
                error!("WebSocket hub error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
            }
        }
    }
}

impl From<ws::Error> for Error {
    fn from(err: ws::Error) -> Self {
        Error::Hub(err)
    }
}

impl From<events::Error> for Error {
    fn from(err: events::Error) -> Self {
        Error::Event(err)
    }
}
