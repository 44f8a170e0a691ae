//! Webhook Routes
//!
//! - POST /services/hooks/:service_id - Receive a repository webhook
//!
//! Answers 200 once routing has been attempted, whatever happened to the
//! individual room deliveries. A payload that cannot be decoded gets the
//! decoder's status code.

use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use waddle_github_bridge::WebhookRequest;

/// Create the webhook router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/services/hooks/:service_id", post(receive_webhook_handler))
        .with_state(state)
}

/// Response body for a routed webhook
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Rooms the notification reached
    pub delivered: usize,
    /// Rooms whose delivery failed
    pub failed: usize,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn receive_webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(service_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(service) = state.registry.get(&service_id) else {
        debug!(service_id = %service_id, "Webhook for unknown service");
        return StatusCode::NOT_FOUND.into_response();
    };

    let request = WebhookRequest {
        event: header(&headers, "x-github-event"),
        signature: header(&headers, "x-hub-signature"),
        signature_256: header(&headers, "x-hub-signature-256"),
        body: &body[..],
    };

    match service.handle_webhook(&request).await {
        Ok(report) => (
            StatusCode::OK,
            Json(WebhookResponse {
                delivered: report.delivered.len(),
                failed: report.failed.len(),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(service_id = %service_id, status = e.status, error = %e.message, "Rejected webhook");
            let status =
                StatusCode::from_u16(e.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, e.message).into_response()
        }
    }
}
