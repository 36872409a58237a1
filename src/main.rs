use events::EventPublisher;
use log::*;
use service::{config::Config, logging::Logger};
use std::sync::Arc;
use ws::{JobEventHandler, Manager};

#[tokio::main]
async fn main() {
    let config = Config::new();

    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
    }

    info!(
        "Starting up Scanorama notification service ({} environment)...",
        config.runtime_env()
    );

    let ws_manager = match Manager::start(config.hub_config()) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("Refusing to start: {e}");
            std::process::exit(1);
        }
    };

    // Job producers publish through this; the hub is its only consumer for now.
    let event_publisher =
        EventPublisher::new().with_handler(Arc::new(JobEventHandler::new(ws_manager.clone())));

    let app_state = web::AppState::new(config, ws_manager.clone(), event_publisher);

    let draining = ws_manager.clone();
    let shutdown = async move {
        shutdown_signal().await;
        info!("Shutdown signal received, draining WebSocket clients");
        draining.shutdown().await;
    };

    if let Err(e) = web::init_server(app_state, shutdown).await {
        error!("Server exited with error: {e}");
    }

    ws_manager.close().await;
    info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
