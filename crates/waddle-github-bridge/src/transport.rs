//! Outbound chat delivery.
//!
//! [`ChatTransport`] is the seam the router and the host deliver through.
//! [`MatrixTransport`] implements it over the Matrix client-server API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::error::{BridgeError, DeliveryError};

/// Message type used for every message the bridge sends.
pub const MSGTYPE_NOTICE: &str = "m.notice";

/// Upper bound on one room delivery, connect to response.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Content of an `m.room.message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub msgtype: String,
    pub body: String,
}

impl ChatMessage {
    /// A bot notice (`m.notice`).
    pub fn notice(body: impl Into<String>) -> Self {
        Self {
            msgtype: MSGTYPE_NOTICE.to_string(),
            body: body.into(),
        }
    }
}

/// Delivers a message to one room.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn deliver(&self, room_id: &str, message: &ChatMessage) -> Result<(), DeliveryError>;
}

/// Matrix client-server API transport, authenticated as the bridge account.
pub struct MatrixTransport {
    http: reqwest::Client,
    homeserver: Url,
    access_token: String,
}

impl MatrixTransport {
    pub fn new(homeserver_url: &str, access_token: impl Into<String>) -> Result<Self, BridgeError> {
        Self::with_timeout(homeserver_url, access_token, DELIVERY_TIMEOUT)
    }

    /// Like [`MatrixTransport::new`] with a custom per-delivery timeout. A
    /// delivery that exceeds it fails with [`DeliveryError::Http`].
    pub fn with_timeout(
        homeserver_url: &str,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("waddle-github-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            homeserver: Url::parse(homeserver_url)?,
            access_token: access_token.into(),
        })
    }

    /// `/_matrix/client/r0/rooms/{room}/send/m.room.message/{txn}` with each
    /// dynamic part encoded as a single path segment.
    fn send_url(&self, room_id: &str, txn_id: &str) -> Result<Url, DeliveryError> {
        let mut url = self.homeserver.clone();
        url.path_segments_mut()
            .map_err(|_| DeliveryError::InvalidRoom(room_id.to_string()))?
            .pop_if_empty()
            .extend(["_matrix", "client", "r0", "rooms", room_id])
            .extend(["send", "m.room.message", txn_id]);
        Ok(url)
    }
}

#[async_trait]
impl ChatTransport for MatrixTransport {
    async fn deliver(&self, room_id: &str, message: &ChatMessage) -> Result<(), DeliveryError> {
        let txn_id = Uuid::new_v4().to_string();
        let url = self.send_url(room_id, &txn_id)?;

        let resp = self
            .http
            .put(url)
            .bearer_auth(&self.access_token)
            .json(message)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(room_id, txn_id = %txn_id, "Delivered message to room");
        Ok(())
    }
}
