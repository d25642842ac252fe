//! HTTP API gateway for Runbox.
//!
//! Exposes the task API under `/api`: submit a task, poll or stream its
//! events, stop it, and inspect the tool catalog and resolved config.
//! Every task runs in a worker owned by the shared [`Supervisor`].

pub mod api;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use runbox_config::AppConfig;
use runbox_supervisor::Supervisor;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub supervisor: Arc<Supervisor>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router: the API nested under `/api`, with a 1 MB body
/// limit, permissive CORS and HTTP trace logging.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .nest("/api", api::api_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Runs until Ctrl-C, then stops every task that is still running.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let supervisor = Arc::new(Supervisor::from_config(&config.supervisor)?);
    let state = Arc::new(GatewayState {
        config,
        supervisor: supervisor.clone(),
    });
    let app = build_router(state);

    info!(addr = %addr, "Starting Runbox gateway");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped, shutting down running tasks");
    supervisor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
