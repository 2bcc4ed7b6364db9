// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Broadcast fan-out.
//!
//! Pushes a parameter change to every registered connection at once.
//! Deliveries are independent: a connection the transport reports gone is
//! removed from the registry, any other failure is recorded as a warning,
//! and neither stops the remaining deliveries.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::outcome::Warning;
use crate::registry::ConnectionRegistry;
use crate::transport::{DeliveryError, PushTransport};

/// `type` tag of a parameter change message.
pub const PARAMS_UPDATE: &str = "PARAMS_UPDATE";

/// Body of a parameter change message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamsUpdate {
    /// Changed parameter set.
    pub param_id: String,
    /// New mean.
    pub mean: f64,
    /// New standard deviation.
    pub std_dev: f64,
    /// Email of the writer.
    pub updated_by: String,
    /// User id of the writer.
    pub user_id: String,
    /// Time the message was built, ms since epoch.
    pub timestamp: i64,
}

/// Envelope sent to connections.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a ParamsUpdate,
}

impl<'a> PushMessage<'a> {
    /// Wrap a parameter change.
    pub fn params_update(data: &'a ParamsUpdate) -> Self {
        Self {
            kind: PARAMS_UPDATE,
            data,
        }
    }
}

/// What a broadcast did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastReport {
    /// Connections a delivery was attempted to.
    pub attempted: usize,
    /// Connections held by another instance, left untouched.
    pub skipped: usize,
    /// Successful deliveries.
    pub delivered: usize,
    /// Connections removed because they were gone.
    pub pruned: Vec<String>,
    /// Delivery, cleanup and scan failures.
    pub warnings: Vec<Warning>,
}

/// Fans parameter changes out to every registered connection.
#[derive(Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
    transport: Arc<dyn PushTransport>,
}

impl Broadcaster {
    /// Create a broadcaster over a registry and a transport.
    pub fn new(registry: ConnectionRegistry, transport: Arc<dyn PushTransport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Push a `PARAMS_UPDATE` for the given values. Never fails.
    pub async fn broadcast(
        &self,
        param_id: &str,
        mean: f64,
        std_dev: f64,
        updated_by: &str,
        user_id: &str,
    ) -> BroadcastReport {
        if !self.transport.enabled() {
            debug!(param_id = %param_id, "Push disabled, skipping broadcast");
            return BroadcastReport::default();
        }

        let update = ParamsUpdate {
            param_id: param_id.to_string(),
            mean,
            std_dev,
            updated_by: updated_by.to_string(),
            user_id: user_id.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        self.send(&update).await
    }

    /// Deliver a prepared message to every registered connection.
    pub async fn send(&self, update: &ParamsUpdate) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let connections = match self.registry.list_all().await {
            Ok(connections) => connections,
            Err(e) => {
                warn!(error = %e, "Failed to list connections for broadcast");
                report.warnings.push(Warning::ConnectionScan {
                    message: e.to_string(),
                });
                return report;
            }
        };

        let total = connections.len();
        let connections: Vec<_> = connections
            .into_iter()
            .filter(|conn| self.transport.serves(conn))
            .collect();
        report.skipped = total - connections.len();

        // Serializing a struct of plain fields cannot fail
        let payload = serde_json::to_string(&PushMessage::params_update(update))
            .unwrap_or_default();

        let deliveries = connections.iter().map(|conn| {
            let transport = Arc::clone(&self.transport);
            let payload = payload.as_str();
            async move {
                let result = transport.post(&conn.connection_id, payload).await;
                (conn.connection_id.as_str(), result)
            }
        });
        let results = join_all(deliveries).await;

        report.attempted = results.len();
        for (connection_id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Gone(_)) => {
                    debug!(connection_id = %connection_id, "Connection gone, removing");
                    match self.registry.remove_stale(connection_id).await {
                        Ok(_) => report.pruned.push(connection_id.to_string()),
                        Err(e) => {
                            warn!(
                                connection_id = %connection_id,
                                error = %e,
                                "Failed to remove stale connection"
                            );
                            report.warnings.push(Warning::StaleCleanup {
                                connection_id: connection_id.to_string(),
                                message: e.to_string(),
                            });
                        }
                    }
                }
                Err(DeliveryError::Failed(message)) => {
                    warn!(
                        connection_id = %connection_id,
                        transport = self.transport.name(),
                        error = %message,
                        "Delivery failed"
                    );
                    report.warnings.push(Warning::Delivery {
                        connection_id: connection_id.to_string(),
                        message,
                    });
                }
            }
        }

        info!(
            param_id = %update.param_id,
            attempted = report.attempted,
            delivered = report.delivered,
            pruned = report.pruned.len(),
            skipped = report.skipped,
            "Broadcast complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_shape() {
        let update = ParamsUpdate {
            param_id: "p1".to_string(),
            mean: 5.0,
            std_dev: 2.0,
            updated_by: "u1@x.com".to_string(),
            user_id: "u1".to_string(),
            timestamp: 1_700_000_000_000,
        };

        let json = serde_json::to_value(PushMessage::params_update(&update)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "PARAMS_UPDATE",
                "data": {
                    "paramId": "p1",
                    "mean": 5.0,
                    "stdDev": 2.0,
                    "updatedBy": "u1@x.com",
                    "userId": "u1",
                    "timestamp": 1_700_000_000_000_i64,
                }
            })
        );
    }
}
