use crate::controller::{admin_controller, health_check_controller, status_controller};
use crate::websocket::handler as websocket_handler;
use crate::{params, AppState};
use axum::{
    routing::{get, post},
    Router,
};

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI document. To be a part
// of the rendered document, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Scanorama Notification API"
        ),
        paths(
            health_check_controller::health_check,
            status_controller::read,
            admin_controller::broadcast,
            websocket_handler::general,
            websocket_handler::scans,
            websocket_handler::discovery,
        ),
        components(
            schemas(
                params::broadcast::BroadcastParams,
                status_controller::ServiceStatus,
                status_controller::ClientCounts,
                status_controller::HubStats,
                status_controller::MessageCounts,
            )
        ),
        tags(
            (name = "scanorama", description = "Real-time scan and discovery progress")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(status_routes(app_state.clone()))
        .merge(websocket_routes(app_state.clone()))
        .merge(admin_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn status_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status_controller::read))
        .with_state(app_state)
}

fn websocket_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/v1/ws", get(websocket_handler::general))
        .route("/api/v1/ws/scans", get(websocket_handler::scans))
        .route("/api/v1/ws/discovery", get(websocket_handler::discovery))
        .with_state(app_state)
}

// TODO: put operator endpoints behind authentication once the platform's
// session layer is wired into this service.
fn admin_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/admin/broadcast",
            post(admin_controller::broadcast),
        )
        .with_state(app_state)
}
