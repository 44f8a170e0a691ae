//! Webhook fan-out.
//!
//! Delivers a decoded event to every room subscribed to its type. Delivery
//! is best-effort and independent per room: one room failing never stops the
//! others, and nothing is rolled back or retried.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::DeliveryError;
use crate::subscription::SubscriptionTable;
use crate::transport::ChatTransport;
use crate::webhook::WebhookEvent;

/// Outcome of one routing pass.
#[derive(Debug, Default)]
pub struct RoutingReport {
    /// Rooms the message reached.
    pub delivered: Vec<String>,
    /// Rooms whose delivery failed, with the reason.
    pub failed: Vec<(String, DeliveryError)>,
}

impl RoutingReport {
    /// Number of rooms a delivery was attempted for.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Fans webhook events out to subscribed rooms.
#[derive(Clone)]
pub struct WebhookRouter {
    transport: Arc<dyn ChatTransport>,
}

impl WebhookRouter {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// Route `event` against a subscription snapshot.
    ///
    /// Deliveries run concurrently. Failures are logged and recorded in the
    /// report; the pass itself always completes.
    #[instrument(skip_all, fields(event_type = %event.event_type, repo = %event.repository))]
    pub async fn route(&self, table: &SubscriptionTable, event: &WebhookEvent) -> RoutingReport {
        let deliveries = table.rooms_for(&event.event_type).map(|room_id| async move {
            info!(
                event_type = %event.event_type,
                repo = %event.repository,
                room_id,
                "Sending notification to room"
            );
            let result = self.transport.deliver(room_id, &event.message).await;
            (room_id.to_string(), result)
        });

        let mut report = RoutingReport::default();
        for (room_id, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered.push(room_id),
                Err(e) => {
                    warn!(error = %e, room_id = %room_id, "Failed to send notification to room");
                    report.failed.push((room_id, e));
                }
            }
        }
        report
    }
}
