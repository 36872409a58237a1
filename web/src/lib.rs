use axum::http::{header, HeaderName, HeaderValue, Method};
use events::EventPublisher;
use log::*;
use service::config::Config;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, CorsLayer};

mod controller;
mod error;
mod extractors;
mod params;
pub mod router;
mod websocket;

pub use error::{Error, Result};

// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub ws_manager: Arc<ws::Manager>,
    pub event_publisher: EventPublisher,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, ws_manager: Arc<ws::Manager>, event_publisher: EventPublisher) -> Self {
        Self {
            config,
            ws_manager,
            event_publisher,
            started_at: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Binds the configured interface and port and serves the API until
/// `shutdown` resolves.
pub async fn init_server(
    app_state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let interface = app_state.config.interface.as_deref().unwrap_or("127.0.0.1");
    let server_url = format!("{}:{}", interface, app_state.config.port);
    let listener = tokio::net::TcpListener::bind(&server_url).await?;

    info!("Server starting... listening for connections on http://{server_url}");

    let cors_layer = cors_layer(&app_state.config);
    let app = router::define_routes(app_state).layer(cors_layer);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(extractors::request_id::X_REQUEST_ID),
        ])
        .allow_origin(AllowOrigin::list(origins))
}
