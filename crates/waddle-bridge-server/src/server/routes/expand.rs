//! Expansion Routes
//!
//! - POST /services/expand/:service_id - Offer observed room text to a service
//!
//! Returns the notice to post (200) or 204 when there is nothing to say.

use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use waddle_github_bridge::BridgeError;

/// Create the expansion router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/services/expand/:service_id", post(expand_handler))
        .with_state(state)
}

/// Request body for an expansion
#[derive(Debug, Deserialize)]
pub struct ExpandRequest {
    /// Room the text was observed in
    pub room_id: String,
    /// Observed text
    pub text: String,
}

async fn expand_handler(
    State(state): State<Arc<AppState>>,
    Path(service_id): Path<String>,
    Json(req): Json<ExpandRequest>,
) -> Response {
    match state
        .registry
        .expand(&service_id, &req.room_id, &req.text)
        .await
    {
        Ok(Some(message)) => (StatusCode::OK, Json(message)).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(BridgeError::ServiceNotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
