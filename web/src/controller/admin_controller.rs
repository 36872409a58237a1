use crate::controller::ApiResponse;
use crate::extractors::request_id::RequestId;
use crate::params::broadcast::BroadcastParams;
use crate::{AppState, Error};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use events::JobEvent;
use serde_json::json;
use ws::message::SYSTEM_MESSAGE;

use log::*;

/// POST a system message to every connected WebSocket client
#[utoipa::path(
    post,
    path = "/api/v1/admin/broadcast",
    params(
        ("X-Request-ID" = Option<String>, Header, description = "Correlation id echoed to clients as request_id")
    ),
    request_body = BroadcastParams,
    responses(
        (status = 202, description = "Broadcast queued for delivery"),
        (status = 422, description = "Unprocessable Entity"),
        (status = 503, description = "Broadcast buffer full or service shutting down")
    )
)]
pub async fn broadcast(
    State(app_state): State<AppState>,
    RequestId(request_id): RequestId,
    Json(params): Json<BroadcastParams>,
) -> Result<impl IntoResponse, Error> {
    if params.message.trim().is_empty() {
        return Err(Error::InvalidParams("message must not be empty".to_string()));
    }
    let kind = params
        .kind
        .filter(|kind| !kind.trim().is_empty())
        .unwrap_or_else(|| SYSTEM_MESSAGE.to_string());

    debug!("POST broadcast {kind} system message (request_id={request_id:?})");

    app_state
        .event_publisher
        .publish(JobEvent::SystemNotice {
            kind: kind.clone(),
            message: params.message,
            request_id,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(
            StatusCode::ACCEPTED.into(),
            json!({ "type": kind }),
        )),
    ))
}
