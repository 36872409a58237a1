use crate::extractors::request_id::RequestId;
use crate::websocket::transport;
use crate::{AppState, Error};
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use log::*;
use std::sync::Arc;
use ws::{Interest, Manager};

/// GET upgrade to a WebSocket receiving scan and discovery updates
#[utoipa::path(
    get,
    path = "/api/v1/ws",
    params(
        ("X-Request-ID" = Option<String>, Header, description = "Correlation id logged with the connection")
    ),
    responses(
        (status = 101, description = "Switching Protocols"),
        (status = 400, description = "Not a valid WebSocket upgrade request"),
        (status = 503, description = "Service shutting down")
    )
)]
pub(crate) async fn general(
    State(app_state): State<AppState>,
    RequestId(request_id): RequestId,
    upgrade_request: WebSocketUpgrade,
) -> Response {
    upgrade(upgrade_request, Interest::General, request_id, app_state.ws_manager)
}

/// GET upgrade to a WebSocket receiving scan updates only
#[utoipa::path(
    get,
    path = "/api/v1/ws/scans",
    responses(
        (status = 101, description = "Switching Protocols"),
        (status = 400, description = "Not a valid WebSocket upgrade request"),
        (status = 503, description = "Service shutting down")
    )
)]
pub(crate) async fn scans(
    State(app_state): State<AppState>,
    RequestId(request_id): RequestId,
    upgrade_request: WebSocketUpgrade,
) -> Response {
    upgrade(upgrade_request, Interest::Scan, request_id, app_state.ws_manager)
}

/// GET upgrade to a WebSocket receiving discovery updates only
#[utoipa::path(
    get,
    path = "/api/v1/ws/discovery",
    responses(
        (status = 101, description = "Switching Protocols"),
        (status = 400, description = "Not a valid WebSocket upgrade request"),
        (status = 503, description = "Service shutting down")
    )
)]
pub(crate) async fn discovery(
    State(app_state): State<AppState>,
    RequestId(request_id): RequestId,
    upgrade_request: WebSocketUpgrade,
) -> Response {
    upgrade(upgrade_request, Interest::Discovery, request_id, app_state.ws_manager)
}

fn upgrade(
    upgrade_request: WebSocketUpgrade,
    interest: Interest,
    request_id: Option<String>,
    manager: Arc<Manager>,
) -> Response {
    if !manager.is_accepting() {
        return Error::from(ws::Error::ShuttingDown).into_response();
    }

    let max_message_size = manager.config().max_message_size;
    upgrade_request
        .max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {e}"))
        .on_upgrade(move |socket| register(socket, interest, request_id, manager))
}

async fn register(
    socket: WebSocket,
    interest: Interest,
    request_id: Option<String>,
    manager: Arc<Manager>,
) {
    let (sink, source) = transport::split(socket);
    let request_id = request_id.as_deref().unwrap_or("-");

    match manager.register(interest, sink, source).await {
        Ok(connection_id) => info!(
            "WebSocket client {connection_id} connected for {interest} updates (request_id={request_id})"
        ),
        Err(e) => warn!("Rejected WebSocket client (request_id={request_id}): {e}"),
    }
}
