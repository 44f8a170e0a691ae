use anyhow::Result;
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};
use waddle_github_bridge::ServiceRegistry;

mod routes;

/// Server application state
pub struct AppState {
    /// Live services, keyed by service id
    pub registry: Arc<ServiceRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }
}

/// Start the HTTP server
pub async fn start(addr: SocketAddr, registry: Arc<ServiceRegistry>) -> Result<()> {
    let state = Arc::new(AppState::new(registry));
    let app = create_router(state);

    info!("Starting Axum HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the Axum router with all routes and middleware
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .merge(routes::hooks::router(state.clone()))
        .merge(routes::expand::router(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    services: usize,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "waddle-bridge-server",
        version: env!("CARGO_PKG_VERSION"),
        services: state.registry.len(),
    })
}
