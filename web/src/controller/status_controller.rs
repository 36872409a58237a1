use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;
use ws::{ConnectedCounts, HubMetricsSnapshot, MessagesSent};

/// Connected WebSocket clients per subscriber class.
#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct ClientCounts {
    pub scan: usize,
    pub discovery: usize,
    /// Distinct connections; a general subscriber counts once.
    pub total: usize,
}

impl From<ConnectedCounts> for ClientCounts {
    fn from(counts: ConnectedCounts) -> Self {
        Self {
            scan: counts.scan,
            discovery: counts.discovery,
            total: counts.total,
        }
    }
}

/// Messages enqueued to WebSocket clients per topic since startup.
#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct MessageCounts {
    pub scan: u64,
    pub discovery: u64,
    pub system: u64,
}

impl From<MessagesSent> for MessageCounts {
    fn from(sent: MessagesSent) -> Self {
        Self {
            scan: sent.scan,
            discovery: sent.discovery,
            system: sent.system,
        }
    }
}

/// WebSocket hub counters since startup.
#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct HubStats {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub active_connections: u64,
    pub messages_sent: MessageCounts,
    /// Broadcasts refused because a topic buffer was full.
    pub publishes_dropped: u64,
    pub slow_consumer_evictions: u64,
    pub expired_evictions: u64,
}

impl From<HubMetricsSnapshot> for HubStats {
    fn from(metrics: HubMetricsSnapshot) -> Self {
        Self {
            connections_opened: metrics.connections_opened,
            connections_closed: metrics.connections_closed,
            active_connections: metrics.active_connections,
            messages_sent: metrics.messages_sent.into(),
            publishes_dropped: metrics.publishes_dropped,
            slow_consumer_evictions: metrics.slow_consumer_evictions,
            expired_evictions: metrics.expired_evictions,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct ServiceStatus {
    /// `ok` while accepting clients, `shutting_down` once draining.
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "development")]
    pub runtime_env: String,
    pub uptime_seconds: u64,
    pub websocket: ClientCounts,
    pub metrics: HubStats,
}

/// GET service status, connected WebSocket client counts and hub metrics
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Current service status", body = ServiceStatus)
    )
)]
pub async fn read(State(app_state): State<AppState>) -> impl IntoResponse {
    let status = if app_state.ws_manager.is_accepting() {
        "ok"
    } else {
        "shutting_down"
    };

    Json(ServiceStatus {
        status: status.to_string(),
        runtime_env: app_state.config.runtime_env().to_string(),
        uptime_seconds: app_state.uptime().as_secs(),
        websocket: app_state.ws_manager.connected_counts().into(),
        metrics: app_state.ws_manager.metrics().into(),
    })
}
