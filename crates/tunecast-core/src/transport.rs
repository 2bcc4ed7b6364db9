// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Push transports.
//!
//! A [`PushTransport`] delivers a serialized message to one connection.
//! The fan-out always holds a transport; when real-time push is turned
//! off it holds a [`NoopTransport`], which reports itself disabled.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::persistence::ConnectionRecord;

/// Request timeout for callback deliveries.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a delivery failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection no longer exists and should be dropped from the registry.
    #[error("connection '{0}' is gone")]
    Gone(String),

    /// Any other failure. The connection is kept.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Delivers messages to individual connections.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// False if push is turned off. A disabled transport is never called.
    fn enabled(&self) -> bool {
        true
    }

    /// Whether this transport delivers to `connection`. Connections it
    /// does not serve are skipped by the fan-out and never pruned.
    fn serves(&self, _connection: &ConnectionRecord) -> bool {
        true
    }

    /// Deliver `payload` to `connection_id`.
    async fn post(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError>;
}

/// Transport used when real-time push is turned off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

#[async_trait]
impl PushTransport for NoopTransport {
    fn name(&self) -> &'static str {
        "none"
    }

    fn enabled(&self) -> bool {
        false
    }

    async fn post(&self, _connection_id: &str, _payload: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Posts messages to a gateway's connection callback endpoint.
///
/// Each delivery is `POST {endpoint}/@connections/{connection_id}` with the
/// payload as the body. `410 Gone` means the connection was closed.
#[derive(Debug, Clone)]
pub struct CallbackTransport {
    client: Client,
    endpoint: String,
}

impl CallbackTransport {
    /// Create a transport for `endpoint` (no trailing slash needed).
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(CALLBACK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(client, endpoint)
    }

    /// Create a transport with a preconfigured HTTP client.
    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { client, endpoint }
    }

    fn connection_url(&self, connection_id: &str) -> String {
        format!("{}/@connections/{}", self.endpoint, connection_id)
    }
}

#[async_trait]
impl PushTransport for CallbackTransport {
    fn name(&self) -> &'static str {
        "callback"
    }

    async fn post(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.connection_url(connection_id))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| DeliveryError::Failed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::GONE {
            return Err(DeliveryError::Gone(connection_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Failed(format!("HTTP {}: {}", status, body)));
        }

        debug!(connection_id = %connection_id, "Delivered via callback");
        Ok(())
    }
}
